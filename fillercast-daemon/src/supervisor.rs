use std::time::Duration;

use fillercast_common::config::ScheduleConfig;
use tracing::{debug, info, warn};

use crate::controller::{Connector, Controller, ControllerError};
use crate::dispatcher::{DispatchResult, QueueDispatcher};
use crate::publish::Publisher;
use crate::tracker::SceneStateTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Healthy,
}

/// Owns the controller session and the published state. Runs until the
/// process is killed: every fault drops the session, publishes the outage and
/// reconnects after a fixed delay.
pub struct ConnectionSupervisor {
    connector: Box<dyn Connector>,
    tracker: SceneStateTracker,
    dispatcher: QueueDispatcher,
    publisher: Publisher,
    tick_interval: Duration,
    retry_delay: Duration,
    state: SessionState,
}

impl ConnectionSupervisor {
    pub fn new(
        connector: Box<dyn Connector>,
        dispatcher: QueueDispatcher,
        publisher: Publisher,
        schedule: &ScheduleConfig,
    ) -> Self {
        Self {
            connector,
            tracker: SceneStateTracker::new(),
            dispatcher,
            publisher,
            tick_interval: schedule.tick_interval,
            retry_delay: schedule.retry_delay,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug!("[SUPERVISOR] {:?} -> {:?}", self.state, next);
        self.state = next;
        self.publisher.set_connected(next == SessionState::Healthy);
    }

    pub async fn run(&mut self) {
        let mut failures: u64 = 0;
        loop {
            let err = self.run_session().await;
            failures += 1;
            self.transition(SessionState::Disconnected);
            self.tracker.reset();
            warn!(
                "[SUPERVISOR] Controller unavailable: {}. Retrying in {:?} (failure #{})",
                err, self.retry_delay, failures
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Connects and ticks until the session faults, then returns the fault.
    pub async fn run_session(&mut self) -> ControllerError {
        self.transition(SessionState::Connecting);
        let mut controller = match self.connector.connect().await {
            Ok(controller) => controller,
            Err(e) => return e,
        };
        self.transition(SessionState::Healthy);
        info!("[SUPERVISOR] Controller connected");

        loop {
            if let Err(e) = self.tick(&mut *controller).await {
                return e;
            }
            tokio::time::sleep(self.tick_interval).await;
        }
    }

    /// One sample followed by one dispatch evaluation.
    pub async fn tick(&mut self, controller: &mut dyn Controller) -> Result<DispatchResult, ControllerError> {
        let sample = self.tracker.sample(controller, &mut self.publisher).await?;
        self.dispatcher
            .maybe_dispatch(&sample, controller, &mut self.publisher)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeObs, FakeProbe};
    use fillercast_common::config::SceneConfig;
    use fillercast_common::status::{read_line_record, read_status};
    use fillercast_common::{ResolvedPaths, WorkQueueStore};
    use std::sync::Arc;

    struct Harness {
        _dir: tempfile::TempDir,
        paths: ResolvedPaths,
        queue: WorkQueueStore,
        obs: FakeObs,
        supervisor: ConnectionSupervisor,
    }

    fn harness(obs: FakeObs, durations: &[(&str, f64)]) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let paths = ResolvedPaths::in_dir(dir.path());
        let queue = WorkQueueStore::new(&paths.queue);
        let dispatcher = QueueDispatcher::new(queue.clone(), Arc::new(FakeProbe::new(durations)), SceneConfig::default());
        let supervisor = ConnectionSupervisor::new(
            Box::new(obs.clone()),
            dispatcher,
            Publisher::new(paths.clone()),
            &ScheduleConfig::default(),
        );
        Harness { _dir: dir, paths, queue, obs, supervisor }
    }

    fn connected(paths: &ResolvedPaths) -> Option<bool> {
        read_status(&paths.status).map(|s| s.connected)
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connections_retry_forever_at_fixed_delay() {
        let obs = FakeObs::default();
        obs.update(|s| s.refuse_connect = true);
        let Harness { _dir, paths, obs, mut supervisor, .. } = harness(obs, &[]);

        let handle = tokio::spawn(async move { supervisor.run().await });

        // Attempts at t = 0, 5, 10, 15, 20.
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(obs.connects(), 5);
        assert_eq!(connected(&paths), Some(false));

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(obs.connects(), 15);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_session_samples_once_per_tick() {
        let Harness { _dir, paths, obs, mut supervisor, .. } = harness(FakeObs::with_scene("News"), &[]);

        let handle = tokio::spawn(async move { supervisor.run().await });

        // Samples at t = 0, 5, 10.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(obs.connects(), 1);
        assert_eq!(obs.calls(), vec![Call::ActiveScene; 3]);
        assert_eq!(connected(&paths), Some(true));
        assert_eq!(read_line_record(&paths.scene).as_deref(), Some("news"));
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn fault_mid_tick_publishes_outage_then_reconnects() {
        let obs = FakeObs::with_scene("filler");
        obs.update(|s| s.fail_playlist = true);
        let Harness { _dir, paths, queue, obs, mut supervisor } = harness(obs, &[]);
        queue.append(&["/lib/a.mp4"]).unwrap();

        let handle = tokio::spawn(async move { supervisor.run().await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(obs.connects(), 1);
        assert_eq!(connected(&paths), Some(false));
        assert_eq!(queue.snapshot().unwrap().len(), 1);

        // The controller recovers; the restored item goes out on the next session.
        obs.update(|s| {
            s.fail_playlist = false;
            s.scene = "filler".to_string();
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(obs.connects(), 2);
        assert_eq!(connected(&paths), Some(true));
        assert!(!queue.has_pending());
        assert_eq!(read_line_record(&paths.now_playing).as_deref(), Some("a"));
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn query_failure_ends_session() {
        let obs = FakeObs::with_scene("filler");
        obs.update(|s| s.fail_scene_query = true);
        let Harness { _dir, paths, obs, mut supervisor, .. } = harness(obs, &[]);

        let err = supervisor.run_session().await;
        assert!(matches!(err, ControllerError::Closed));
        assert_eq!(supervisor.state(), SessionState::Healthy);
        assert_eq!(obs.connects(), 1);
        assert_eq!(connected(&paths), Some(true));
    }

    #[tokio::test]
    async fn tick_dispatches_once_then_idles() {
        let obs = FakeObs::with_scene("filler");
        let Harness { _dir, paths, queue, obs, mut supervisor } =
            harness(obs, &[("/lib/a.mp4", 100.0), ("/lib/b.mkv", 50.0)]);
        queue.append(&["/lib/a.mp4", "/lib/b.mkv"]).unwrap();
        let mut session = obs.clone();

        let first = supervisor.tick(&mut session).await.unwrap();
        assert!(matches!(first, DispatchResult::Dispatched { items: 2, total_duration_secs, .. } if total_duration_secs == 150.0));

        let second = supervisor.tick(&mut session).await.unwrap();
        assert_eq!(second, DispatchResult::Skipped);
        assert_eq!(read_line_record(&paths.scene).as_deref(), Some("select"));
        assert_eq!(
            obs.calls(),
            vec![
                Call::ActiveScene,
                Call::SetActiveScene("select".to_string()),
                Call::SetInputPlaylist(
                    "selectsource".to_string(),
                    vec!["/lib/a.mp4".to_string(), "/lib/b.mkv".to_string()]
                ),
                Call::ActiveScene,
            ]
        );
        assert_eq!(supervisor.publisher().status().now_playing.as_deref(), Some("a"));
    }
}
