use tracing_subscriber::{prelude::*, EnvFilter, Registry};
use tracing_subscriber::fmt as subscriber_fmt;
use tracing_subscriber::filter::LevelFilter;
use tracing::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

mod controller;
mod dispatcher;
mod obs;
mod probe;
mod publish;
mod supervisor;
mod tracker;
#[cfg(test)]
mod testing;

use chrono::Local;
use fillercast_common::{Config, WorkQueueStore};

struct CustomTimer;

impl tracing_subscriber::fmt::time::FormatTime for CustomTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hands queued media to OBS whenever the filler scene is on air", long_about = None)]
struct Args {
    /// Show version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Config file (defaults to ~/.config/fillercast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log verbosity: 1 warn, 2 info, 3 debug, 4 trace. Also writes a log file.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    log: Option<u8>,
}

type LogGuards = (
    Option<tracing_appender::non_blocking::WorkerGuard>,
    Option<tracing_appender::non_blocking::WorkerGuard>,
);

fn init_logging(log_level: Option<u8>) -> anyhow::Result<LogGuards> {
    let filter = match log_level {
        Some(1) => LevelFilter::WARN,
        Some(3) => LevelFilter::DEBUG,
        Some(4) => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(filter.into())
        .from_env_lossy()
        .add_directive("tungstenite=warn".parse()?)
        .add_directive("tokio_tungstenite=warn".parse()?);

    if let Some(level) = log_level {
        let log_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("fillercast")
            .join("logs");
        std::fs::create_dir_all(&log_dir)?;

        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let log_path = log_dir.join(format!("fillercast-daemon-{}.log", timestamp));
        let file = std::fs::File::create(&log_path)?;
        println!("Logging to file: {}", log_path.display());
        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        let file_layer = subscriber_fmt::layer()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_timer(CustomTimer);

        let stdout_layer = subscriber_fmt::layer()
            .with_writer(non_blocking_stdout)
            .with_timer(CustomTimer);

        Registry::default()
            .with(env_filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();

        info!("Fillercast daemon starting... (Level {}, File: {})", level, log_dir.display());
        Ok((Some(file_guard), Some(stdout_guard)))
    } else {
        let stdout_layer = subscriber_fmt::layer()
            .with_writer(std::io::stdout)
            .with_timer(CustomTimer);

        Registry::default()
            .with(env_filter)
            .with(stdout_layer)
            .init();
        info!("Fillercast daemon starting...");
        Ok((None, None))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 1. Initialize Logging
    let _guards = init_logging(args.log)?;

    // 2. Load Configuration
    let config = match Config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Failed to load configuration: {:#}. Using defaults.", e);
            Config::default()
        }
    };
    let paths = config.paths();
    info!(
        "Controller ws://{}:{} | filler '{}' -> select '{}' (input '{}')",
        config.controller.host,
        config.controller.port,
        config.scenes.filler,
        config.scenes.select,
        config.scenes.playlist_input
    );
    info!("Queue: {}", paths.queue.display());

    // 3. Wire the scheduler
    let probe = Arc::new(probe::FfprobeProbe::new(&config.probe));
    let dispatcher = dispatcher::QueueDispatcher::new(
        WorkQueueStore::new(&paths.queue),
        probe,
        config.scenes.clone(),
    );
    let publisher = publish::Publisher::new(paths);
    let connector = Box::new(obs::ObsConnector::new(config.controller.clone()));
    let mut supervisor = supervisor::ConnectionSupervisor::new(connector, dispatcher, publisher, &config.schedule);

    // 4. Run until killed
    supervisor.run().await;
    Ok(())
}
