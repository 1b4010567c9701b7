use clap::{Parser, Subcommand};
use fillercast_common::status::{read_line_record, read_status};
use fillercast_common::{Config, PublishedStatus, WorkQueueStore};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "fcctl",
    version,
    about = "Fillercast control utility - queue media for the next filler slot",
    long_about = r#"
Fillercast Control Utility (fcctl)
══════════════════════════════════

Appends media to the queue the fillercast daemon hands to OBS the next time
the filler scene is on air, and shows what the daemon last published.

EXAMPLES:
  fcctl enqueue ~/movies/a.mp4 ~/movies/b.mkv   Queue two files
  fcctl enqueue --force ~/movies/a.mp4          Queue even while a movie plays
  fcctl list                                    Show the queue
  fcctl status                                  Connection, scene, next slot

CONFIG:
  ~/.config/fillercast/config.toml
"#,
    after_help = "Use 'fcctl <command> --help' for more info on a specific command."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.config/fillercast/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// Append files to the queue, in the order given
    #[command(visible_alias = "add")]
    Enqueue {
        /// Media files to queue
        #[arg(required = true)]
        paths: Vec<String>,

        /// Queue even when the daemon is offline or the filler scene is not on air
        #[arg(short, long)]
        force: bool,

        /// Reject paths that do not exist
        #[arg(short, long)]
        strict: bool,
    },

    /// Show the queued files
    #[command(visible_alias = "ls")]
    List,

    /// Show what the daemon last published
    #[command(visible_alias = "st")]
    Status,

    /// Validate configuration and show resolved paths
    #[command(name = "check-config", visible_alias = "cc")]
    CheckConfig,
}

/// Why an enqueue is refused without `--force`.
fn gate(config: &Config, status: Option<&PublishedStatus>) -> Option<&'static str> {
    match status {
        None => Some("the daemon has not published a status yet"),
        Some(s) if !s.connected => Some("the daemon is not connected to OBS"),
        Some(s) if !s.scene.as_deref().is_some_and(|scene| config.scenes.is_filler(scene)) => {
            Some("a movie is playing right now; try again once the filler scene is back")
        }
        Some(_) => None,
    }
}

fn missing_paths(paths: &[String]) -> Vec<&str> {
    paths
        .iter()
        .map(String::as_str)
        .filter(|p| !Path::new(p.trim()).is_file())
        .collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    if let Commands::CheckConfig = cli.command {
        match Config::load(config_path) {
            Ok(config) => {
                let paths = config.paths();
                println!("✓ Configuration valid");
                println!("  controller   ws://{}:{} (timeout {:?})", config.controller.host, config.controller.port, config.controller.timeout);
                println!("  scenes       filler '{}' -> select '{}', input '{}'", config.scenes.filler, config.scenes.select, config.scenes.playlist_input);
                println!("  schedule     tick {:?}, retry {:?}", config.schedule.tick_interval, config.schedule.retry_delay);
                println!("  probe        {} (timeout {:?})", config.probe.program, config.probe.timeout);
                println!("  queue        {}", paths.queue.display());
                println!("  scene        {}", paths.scene.display());
                println!("  now playing  {}", paths.now_playing.display());
                println!("  end time     {}", paths.end_time.display());
                println!("  status       {}", paths.status.display());
            }
            Err(e) => {
                eprintln!("✗ Configuration error: {:#}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let config = Config::load(config_path)?;
    let paths = config.paths();
    let queue = WorkQueueStore::new(&paths.queue);

    match cli.command {
        Commands::Enqueue { paths: files, force, strict } => {
            if !force {
                if let Some(reason) = gate(&config, read_status(&paths.status).as_ref()) {
                    eprintln!("🚫 Not queued: {}. Use --force to queue anyway.", reason);
                    std::process::exit(1);
                }
            }
            if strict {
                let missing = missing_paths(&files);
                if !missing.is_empty() {
                    for p in missing {
                        eprintln!("✗ No such file: {}", p);
                    }
                    std::process::exit(1);
                }
            }
            queue.append(files.as_slice())?;
            for file in &files {
                println!("✅ Added to queue: {}", file.trim());
            }
        }
        Commands::List => {
            if !queue.path().exists() {
                println!("📄 Queue file missing.");
            } else {
                let entries = queue.snapshot()?;
                if entries.is_empty() {
                    println!("📄 Queue is empty.");
                } else {
                    println!("📄 Queue:");
                    for (i, entry) in entries.iter().enumerate() {
                        println!(" {:>2}. {}", i + 1, entry.path);
                    }
                }
            }
        }
        Commands::Status => match read_status(&paths.status) {
            Some(status) => {
                println!("{:<12} | {}", "Connected", if status.connected { "yes" } else { "no" });
                println!("{:<12} | {}", "Scene", status.scene.as_deref().unwrap_or("unknown"));
                println!("{:<12} | {}", "Now playing", status.now_playing.as_deref().unwrap_or("-"));
                println!("{:<12} | {}", "Next slot", status.next_slot.as_deref().unwrap_or("-"));
                if let Some(updated) = status.updated_at {
                    println!("{:<12} | {}", "Updated", updated.format("%Y-%m-%d %H:%M:%S"));
                }
            }
            None => {
                let scene = read_line_record(&paths.scene).unwrap_or_else(|| "unknown".to_string());
                println!("No status published at {}", paths.status.display());
                println!("Last scene: {}", scene);
                println!("Is fillercast-daemon running?");
            }
        },
        Commands::CheckConfig => unreachable!(),
    }

    Ok(())
}
