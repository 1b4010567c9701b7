use std::sync::Arc;

use chrono::{DateTime, Local, TimeDelta, TimeZone};
use fillercast_common::config::SceneConfig;
use fillercast_common::{QueueEntry, WorkQueueStore};
use tracing::{debug, error, info, warn};

use crate::controller::{Controller, ControllerError};
use crate::probe::{total_duration, DurationProbe};
use crate::publish::Publisher;
use crate::tracker::SceneSample;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    Skipped,
    Dispatched {
        items: usize,
        total_duration_secs: f64,
        ends_at: DateTime<Local>,
    },
}

/// What was handed to the controller in one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPlan {
    pub items: Vec<QueueEntry>,
    pub total_duration_secs: f64,
}

impl DispatchPlan {
    pub fn paths(&self) -> Vec<String> {
        self.items.iter().map(|e| e.path.clone()).collect()
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// `now + total_secs`, rounded to the millisecond. Out-of-range totals leave
/// `now` unchanged.
pub fn estimate_end<Tz: TimeZone>(now: DateTime<Tz>, total_secs: f64) -> DateTime<Tz> {
    let millis = (total_secs.max(0.0) * 1000.0).round() as i64;
    TimeDelta::try_milliseconds(millis)
        .and_then(|delta| now.clone().checked_add_signed(delta))
        .unwrap_or(now)
}

/// Hands the work queue to the controller whenever the filler scene is on air.
pub struct QueueDispatcher {
    queue: WorkQueueStore,
    probe: Arc<dyn DurationProbe>,
    scenes: SceneConfig,
    clock: Clock,
}

impl QueueDispatcher {
    pub fn new(queue: WorkQueueStore, probe: Arc<dyn DurationProbe>, scenes: SceneConfig) -> Self {
        Self {
            queue,
            probe,
            scenes,
            clock: Arc::new(Local::now),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Local> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn should_dispatch(&self, scene: &SceneSample) -> bool {
        self.scenes.is_filler(&scene.name) && self.queue.has_pending()
    }

    pub async fn maybe_dispatch(
        &self,
        scene: &SceneSample,
        controller: &mut dyn Controller,
        publisher: &mut Publisher,
    ) -> Result<DispatchResult, ControllerError> {
        if !self.should_dispatch(scene) {
            return Ok(DispatchResult::Skipped);
        }

        let items = self.drain().await;
        let Some(first) = items.first() else {
            debug!("[DISPATCH] Queue emptied before it could be drained");
            return Ok(DispatchResult::Skipped);
        };
        info!("[DISPATCH] Filler on air, dispatching {} queued item(s)", items.len());
        publisher.publish_now_playing(&first.title());

        let mut plan = DispatchPlan { items, total_duration_secs: 0.0 };
        if let Err(e) = self.hand_off(controller, &plan).await {
            warn!("[DISPATCH] Controller rejected the hand-off: {}. Restoring queue.", e);
            self.restore(plan.items).await;
            return Err(e);
        }

        plan.total_duration_secs = total_duration(self.probe.as_ref(), &plan.items).await;
        let ends_at = estimate_end((self.clock)(), plan.total_duration_secs);
        publisher.publish_schedule(ends_at);

        info!(
            "[DISPATCH] {} item(s), {:.2}s total, next slot at {}",
            plan.items.len(),
            plan.total_duration_secs,
            ends_at.format("%I:%M:%S %p")
        );
        Ok(DispatchResult::Dispatched {
            items: plan.items.len(),
            total_duration_secs: plan.total_duration_secs,
            ends_at,
        })
    }

    async fn hand_off(&self, controller: &mut dyn Controller, plan: &DispatchPlan) -> Result<(), ControllerError> {
        controller.set_active_scene(&self.scenes.select).await?;
        controller
            .set_input_playlist(&self.scenes.playlist_input, &plan.paths())
            .await
    }

    /// An unreadable queue counts as empty.
    async fn drain(&self) -> Vec<QueueEntry> {
        let queue = self.queue.clone();
        match tokio::task::spawn_blocking(move || queue.drain()).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                warn!("[QUEUE] Could not read queue, treating it as empty: {}", e);
                Vec::new()
            }
            Err(e) => {
                error!("[QUEUE] Drain task failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn restore(&self, items: Vec<QueueEntry>) {
        let queue = self.queue.clone();
        let count = items.len();
        match tokio::task::spawn_blocking(move || queue.restore_front(&items)).await {
            Ok(Ok(())) => debug!("[QUEUE] Restored {} item(s)", count),
            Ok(Err(e)) => error!("[QUEUE] Failed to restore {} drained item(s): {}", count, e),
            Err(e) => error!("[QUEUE] Restore task failed: {}", e),
        }
    }
}
