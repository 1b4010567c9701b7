use chrono::{DateTime, Local};
use fillercast_common::status::{next_slot_line, read_status, write_atomic};
use fillercast_common::{PublishedStatus, ResolvedPaths};
use std::path::Path;
use tracing::{debug, warn};

/// Sole writer of the published records. Owned by the supervisor and lent to
/// the tracker and dispatcher for the duration of a tick.
///
/// Write failures are logged and otherwise ignored: a full disk must not look
/// like a controller outage.
pub struct Publisher {
    paths: ResolvedPaths,
    status: PublishedStatus,
}

impl Publisher {
    /// Starts from the last status on disk so overlays keep their title and
    /// slot across restarts, but never claims a connection it has not made.
    pub fn new(paths: ResolvedPaths) -> Self {
        let status = read_status(&paths.status)
            .map(|previous| PublishedStatus { connected: false, ..previous })
            .unwrap_or_default();
        let mut publisher = Self { paths, status };
        publisher.flush_status();
        publisher
    }

    pub fn status(&self) -> &PublishedStatus {
        &self.status
    }

    pub fn set_connected(&mut self, connected: bool) {
        if self.status.connected == connected {
            return;
        }
        self.status.connected = connected;
        self.flush_status();
    }

    /// Overwrites the scene record; called every tick.
    pub fn publish_scene(&mut self, scene: &str) {
        write_line(&self.paths.scene, scene);
        if self.status.scene.as_deref() != Some(scene) {
            self.status.scene = Some(scene.to_string());
            self.flush_status();
        }
    }

    pub fn publish_now_playing(&mut self, title: &str) {
        write_line(&self.paths.now_playing, title);
        self.status.now_playing = Some(title.to_string());
        self.flush_status();
    }

    pub fn publish_schedule(&mut self, end: DateTime<Local>) {
        let line = next_slot_line(&end);
        write_line(&self.paths.end_time, &format!("{line}\n"));
        self.status.estimated_end = Some(end);
        self.status.next_slot = Some(line);
        self.flush_status();
    }

    fn flush_status(&mut self) {
        self.status.updated_at = Some(Local::now());
        match serde_json::to_vec_pretty(&self.status) {
            Ok(bytes) => {
                if let Err(e) = write_atomic(&self.paths.status, &bytes) {
                    warn!("Failed to write status record {}: {}", self.paths.status.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize status record: {}", e),
        }
    }
}

fn write_line(path: &Path, contents: &str) {
    match write_atomic(path, contents.as_bytes()) {
        Ok(()) => debug!("Published {} -> {}", path.display(), contents.trim_end()),
        Err(e) => warn!("Failed to write {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fillercast_common::status::read_line_record;

    #[test]
    fn records_are_written_and_mirrored_in_status() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResolvedPaths::in_dir(dir.path());
        let mut publisher = Publisher::new(paths.clone());
        assert_eq!(read_status(&paths.status).map(|s| s.connected), Some(false));

        publisher.set_connected(true);
        publisher.publish_scene("filler");
        publisher.publish_now_playing("a");
        let end = Local.with_ymd_and_hms(2024, 1, 1, 10, 2, 30).single().unwrap();
        publisher.publish_schedule(end);

        assert_eq!(read_line_record(&paths.scene).as_deref(), Some("filler"));
        assert_eq!(read_line_record(&paths.now_playing).as_deref(), Some("a"));
        assert_eq!(
            std::fs::read_to_string(&paths.end_time).unwrap(),
            "Next Slot At 10:02:30 AM\n"
        );

        let status = read_status(&paths.status).unwrap();
        assert!(status.connected);
        assert_eq!(status.scene.as_deref(), Some("filler"));
        assert_eq!(status.now_playing.as_deref(), Some("a"));
        assert_eq!(status.estimated_end, Some(end));
        assert_eq!(status.next_slot.as_deref(), Some("Next Slot At 10:02:30 AM"));
    }

    #[test]
    fn restart_keeps_schedule_but_starts_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResolvedPaths::in_dir(dir.path());
        {
            let mut publisher = Publisher::new(paths.clone());
            publisher.set_connected(true);
            publisher.publish_now_playing("b");
        }

        let publisher = Publisher::new(paths.clone());
        assert!(!publisher.status().connected);
        assert_eq!(publisher.status().now_playing.as_deref(), Some("b"));
        assert!(!read_status(&paths.status).unwrap().connected);
    }
}
