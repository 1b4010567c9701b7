use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use fillercast_common::config::ProbeConfig;
use fillercast_common::QueueEntry;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("probe exited with {status}: {stderr}")]
    Failed { status: std::process::ExitStatus, stderr: String },
    #[error("unparseable probe output {0:?}")]
    Unparseable(String),
}

/// Measures the playback length of a media file, in seconds.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration(&self, path: &str) -> Result<f64, ProbeError>;
}

/// Runs `ffprobe` once per file, bounded by the configured timeout.
pub struct FfprobeProbe {
    program: String,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn duration(&self, path: &str) -> Result<f64, ProbeError> {
        let child = Command::new(&self.program)
            .args([
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries", "format=duration",
                "-of", "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn { program: self.program.clone(), source })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
            .map_err(|source| ProbeError::Spawn { program: self.program.clone(), source })?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses the single number ffprobe prints for `format=duration`.
pub fn parse_duration(stdout: &str) -> Result<f64, ProbeError> {
    let trimmed = stdout.trim();
    match trimmed.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs),
        _ => Err(ProbeError::Unparseable(trimmed.to_string())),
    }
}

/// Sums the durations of `items` one after another; a failed probe counts as 0.
pub async fn total_duration(probe: &dyn DurationProbe, items: &[QueueEntry]) -> f64 {
    let mut total = 0.0;
    for item in items {
        match probe.duration(&item.path).await {
            Ok(secs) => {
                debug!("[PROBE] {} -> {:.2}s", item.path, secs);
                total += secs;
            }
            Err(e) => warn!("[PROBE] Could not measure {}: {}. Counting it as 0s.", item.path, e),
        }
    }
    total
}
