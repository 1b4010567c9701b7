//! Records the daemon publishes for external readers (overlays, bots, `fcctl`).
//!
//! The daemon is the only writer. Every record is replaced through a temp file
//! and a rename so a reader never sees a half-written file.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

pub const QUEUE_FILE: &str = "queue.txt";
pub const SCENE_FILE: &str = "scenename.txt";
pub const NOW_PLAYING_FILE: &str = "moviename.txt";
pub const END_TIME_FILE: &str = "endtime.txt";
pub const STATUS_FILE: &str = "status.json";

/// Clock format used for the "next slot" line, e.g. `07:45:10 PM`.
pub const SLOT_TIME_FORMAT: &str = "%I:%M:%S %p";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PublishedStatus {
    pub connected: bool,
    pub scene: Option<String>,
    pub now_playing: Option<String>,
    pub estimated_end: Option<DateTime<Local>>,
    pub next_slot: Option<String>,
    pub updated_at: Option<DateTime<Local>>,
}

/// Human-readable line written to the end-time record.
pub fn next_slot_line(end: &DateTime<Local>) -> String {
    format!("Next Slot At {}", end.format(SLOT_TIME_FORMAT))
}

pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp_path, path)
}

/// Reads the status record. A missing or unparseable record reads as `None`.
pub fn read_status(path: &Path) -> Option<PublishedStatus> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!("Failed to parse status record {}: {}", path.display(), e);
            None
        }
    }
}

/// Reads a single-line text record, trimmed.
pub fn read_line_record(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
