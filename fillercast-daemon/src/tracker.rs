use chrono::{DateTime, Local};
use tracing::info;

use crate::controller::{Controller, ControllerError};
use crate::publish::Publisher;

#[derive(Debug, Clone, PartialEq)]
pub struct SceneSample {
    /// Lower-cased scene name.
    pub name: String,
    pub observed_at: DateTime<Local>,
}

/// Samples the controller's program scene once per tick.
#[derive(Debug, Default)]
pub struct SceneStateTracker {
    last: Option<SceneSample>,
}

impl SceneStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&SceneSample> {
        self.last.as_ref()
    }

    /// Forget the last sample; the next one after a reconnect is logged fresh.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub async fn sample(
        &mut self,
        controller: &mut dyn Controller,
        publisher: &mut Publisher,
    ) -> Result<SceneSample, ControllerError> {
        let name = controller.active_scene().await?.to_lowercase();

        if self.last.as_ref().map(|s| s.name.as_str()) != Some(name.as_str()) {
            info!(
                "[SCENE] {} -> {}",
                self.last.as_ref().map(|s| s.name.as_str()).unwrap_or("(none)"),
                name
            );
        }
        publisher.publish_scene(&name);

        let sample = SceneSample { name, observed_at: Local::now() };
        self.last = Some(sample.clone());
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeObs;
    use fillercast_common::status::read_line_record;
    use fillercast_common::ResolvedPaths;

    #[tokio::test]
    async fn sample_lowercases_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResolvedPaths::in_dir(dir.path());
        let mut publisher = Publisher::new(paths.clone());
        let mut obs = FakeObs::with_scene("Filler");
        let mut tracker = SceneStateTracker::new();

        let sample = tracker.sample(&mut obs, &mut publisher).await.unwrap();
        assert_eq!(sample.name, "filler");
        assert_eq!(tracker.last().map(|s| s.name.as_str()), Some("filler"));
        assert_eq!(read_line_record(&paths.scene).as_deref(), Some("filler"));
        assert_eq!(publisher.status().scene.as_deref(), Some("filler"));

        obs.update(|s| s.scene = "Movie Night".to_string());
        let sample = tracker.sample(&mut obs, &mut publisher).await.unwrap();
        assert_eq!(sample.name, "movie night");
        assert_eq!(read_line_record(&paths.scene).as_deref(), Some("movie night"));
    }

    #[tokio::test]
    async fn query_failure_propagates_without_publishing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResolvedPaths::in_dir(dir.path());
        let mut publisher = Publisher::new(paths.clone());
        let mut obs = FakeObs::with_scene("filler");
        obs.update(|s| s.fail_scene_query = true);
        let mut tracker = SceneStateTracker::new();

        assert!(tracker.sample(&mut obs, &mut publisher).await.is_err());
        assert!(tracker.last().is_none());
        assert!(!paths.scene.exists());
    }
}
