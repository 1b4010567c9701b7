use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, Context};

use crate::status::{
    END_TIME_FILE, NOW_PLAYING_FILE, QUEUE_FILE, SCENE_FILE, STATUS_FILE,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ControllerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(with = "humantime_serde", default = "default_controller_timeout")]
    pub timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            timeout: default_controller_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SceneConfig {
    /// Scene in which queued items may be handed to the controller.
    #[serde(default = "default_filler_scene")]
    pub filler: String,
    /// Scene hosting the playlist-driven input.
    #[serde(default = "default_select_scene")]
    pub select: String,
    #[serde(default = "default_playlist_input")]
    pub playlist_input: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            filler: default_filler_scene(),
            select: default_select_scene(),
            playlist_input: default_playlist_input(),
        }
    }
}

impl SceneConfig {
    pub fn is_filler(&self, scene: &str) -> bool {
        scene.to_lowercase() == self.filler.to_lowercase()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScheduleConfig {
    #[serde(with = "humantime_serde", default = "default_tick_interval")]
    pub tick_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub retry_delay: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            retry_delay: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProbeConfig {
    #[serde(default = "default_probe_program")]
    pub program: String,
    #[serde(with = "humantime_serde", default = "default_probe_timeout")]
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: default_probe_program(),
            timeout: default_probe_timeout(),
        }
    }
}

/// Locations of the queue mailbox and the published records. Anything left
/// unset lands in the state directory.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct PathsConfig {
    pub queue: Option<PathBuf>,
    pub scene: Option<PathBuf>,
    pub now_playing: Option<PathBuf>,
    pub end_time: Option<PathBuf>,
    pub status: Option<PathBuf>,
}

/// Fully resolved file locations.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPaths {
    pub queue: PathBuf,
    pub scene: PathBuf,
    pub now_playing: PathBuf,
    pub end_time: PathBuf,
    pub status: PathBuf,
}

impl PathsConfig {
    pub fn resolve(&self) -> ResolvedPaths {
        let base = state_dir();
        ResolvedPaths {
            queue: self.queue.clone().unwrap_or_else(|| base.join(QUEUE_FILE)),
            scene: self.scene.clone().unwrap_or_else(|| base.join(SCENE_FILE)),
            now_playing: self.now_playing.clone().unwrap_or_else(|| base.join(NOW_PLAYING_FILE)),
            end_time: self.end_time.clone().unwrap_or_else(|| base.join(END_TIME_FILE)),
            status: self.status.clone().unwrap_or_else(|| base.join(STATUS_FILE)),
        }
    }
}

impl ResolvedPaths {
    /// Every resolved path placed directly inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            queue: dir.join(QUEUE_FILE),
            scene: dir.join(SCENE_FILE),
            now_playing: dir.join(NOW_PLAYING_FILE),
            end_time: dir.join(END_TIME_FILE),
            status: dir.join(STATUS_FILE),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    4455
}

fn default_controller_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_filler_scene() -> String {
    "filler".to_string()
}

fn default_select_scene() -> String {
    "select".to_string()
}

fn default_playlist_input() -> String {
    "selectsource".to_string()
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_program() -> String {
    "ffprobe".to_string()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub scenes: SceneConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// `<state dir>/fillercast`, falling back to the local data directory and then
/// the working directory on platforms without a state directory.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fillercast")
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("fillercast").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

impl Config {
    /// Loads the config from `path`, or from the default location when `None`.
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

        if !config_path.exists() {
            tracing::warn!("No config file found at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;
        if config.schedule.tick_interval.is_zero() {
            anyhow::bail!("[schedule] tick-interval must be greater than zero");
        }
        Ok(config)
    }

    pub fn paths(&self) -> ResolvedPaths {
        self.paths.resolve()
    }
}
