// Stage orchestrator: the shared pull/ack/escalate protocol that turns a
// crash-prone processing step into an at-least-once pipeline stage.
//
// A stage is a configuration value (three queue names plus the entity
// kind it marks on failure) and one generic worker loop. An item lives
// in exactly one of origin/WIP/error at any instant; it leaves WIP only
// through acknowledge() or escalate().

use crate::entities::{MeasurementStatus, MeasurementUpdate, VideoStatus, VideoUpdate};
use crate::pipeline::error::StageError;
use crate::queue::{TaskQueue, WorkItem};
use crate::service::VideoStore;
use anyhow::Result;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct QueueNames {
    pub origin: &'static str,
    pub wip: &'static str,
    pub error: &'static str,
}

/// Which entity an escalated item marks as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Video,
    Measurement,
}

pub const VIDEO_QUEUES: QueueNames = QueueNames {
    origin: "VIDEO_TODO",
    wip: "VIDEO_WIP",
    error: "VIDEO_ERROR",
};

pub const MEASUREMENT_QUEUES: QueueNames = QueueNames {
    origin: "MEASUREMENTS_TODO",
    wip: "MEASUREMENTS_WIP",
    error: "MEASUREMENTS_ERROR",
};

pub struct Stage<'a> {
    pub name: &'static str,
    pub queues: QueueNames,
    pub kind: StageKind,
    queue: &'a dyn TaskQueue,
    store: &'a dyn VideoStore,
}

impl<'a> Stage<'a> {
    pub fn new(
        name: &'static str,
        queues: QueueNames,
        kind: StageKind,
        queue: &'a dyn TaskQueue,
        store: &'a dyn VideoStore,
    ) -> Self {
        Self {
            name,
            queues,
            kind,
            queue,
            store,
        }
    }

    /// Claim the next item: atomically move the origin head to the WIP
    /// tail. `None` when the origin queue is empty.
    pub fn fetch_next(&self) -> Result<Option<WorkItem>> {
        self.queue.transfer(self.queues.origin, self.queues.wip)
    }

    /// Release the oldest WIP entry after its processing side effects
    /// are committed. Exactly once per successful item.
    pub fn acknowledge(&self) -> Result<()> {
        self.queue.pop(self.queues.wip)?;
        Ok(())
    }

    /// Move the oldest WIP entry to the error queue and mark its owning
    /// entity failed so downstream consumers stop waiting on it.
    pub fn escalate(&self) -> Result<()> {
        let Some(item) = self.queue.transfer(self.queues.wip, self.queues.error)? else {
            return Err(anyhow::anyhow!(
                "Escalation requested but the {} WIP queue is empty",
                self.name
            ));
        };

        match self.kind {
            StageKind::Video => {
                self.store
                    .update_video(item, &VideoUpdate::status(VideoStatus::Error))?;
            }
            StageKind::Measurement => {
                self.store.update_measurement(
                    item,
                    &MeasurementUpdate::status(MeasurementStatus::Error),
                )?;
            }
        }
        Ok(())
    }
}

/// Run one stage until shutdown. An empty origin queue sleeps
/// `poll_interval` (interruptibly); a failed item is logged and
/// escalated; the loop itself never dies with an item.
///
/// `on_complete` runs after a successful acknowledge; the optimizer
/// uses it for the measurement fan-out. Its failures are logged, not
/// escalated: the WIP entry is already gone and escalating here would
/// break the one-queue-at-a-time invariant.
pub fn run_worker(
    stage: &Stage,
    poll_interval: Duration,
    shutdown: &Receiver<()>,
    mut process: impl FnMut(WorkItem) -> Result<(), StageError>,
    mut on_complete: impl FnMut(WorkItem) -> Result<()>,
) {
    tracing::info!("{} worker started", stage.name);

    loop {
        let item = match stage.fetch_next() {
            Ok(item) => item,
            Err(error) => {
                tracing::error!("{}: failed to fetch next item: {:#}", stage.name, error);
                if wait_or_shutdown(shutdown, poll_interval) {
                    break;
                }
                continue;
            }
        };

        let Some(item) = item else {
            tracing::debug!("{}: queue empty, sleeping", stage.name);
            if wait_or_shutdown(shutdown, poll_interval) {
                break;
            }
            continue;
        };

        tracing::info!("{}: processing item {}", stage.name, item);
        match process(item) {
            Ok(()) => {
                if let Err(error) = stage.acknowledge() {
                    tracing::error!(
                        "{}: failed to acknowledge item {}: {:#}",
                        stage.name,
                        item,
                        error
                    );
                    continue;
                }
                tracing::info!("{}: item {} complete", stage.name, item);
                if let Err(error) = on_complete(item) {
                    tracing::warn!(
                        "{}: post-completion step for item {} failed: {:#}",
                        stage.name,
                        item,
                        error
                    );
                }
            }
            Err(error) => {
                tracing::warn!("{}: item {} failed: {:#}", stage.name, item, error);
                if let Err(escalation_error) = stage.escalate() {
                    tracing::error!(
                        "{}: failed to escalate item {}: {:#}",
                        stage.name,
                        item,
                        escalation_error
                    );
                }
            }
        }
    }

    tracing::info!("{} worker stopped", stage.name);
}

/// Sleep for `interval`, returning true if shutdown was signalled.
fn wait_or_shutdown(shutdown: &Receiver<()>, interval: Duration) -> bool {
    match shutdown.recv_timeout(interval) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::VideoStatus;
    use crate::test_support::{MemoryQueue, MemoryStore};
    use std::time::Duration;

    fn video_stage<'a>(queue: &'a MemoryQueue, store: &'a MemoryStore) -> Stage<'a> {
        Stage::new("optimizer", VIDEO_QUEUES, StageKind::Video, queue, store)
    }

    #[test]
    fn test_fetch_from_empty_origin_yields_nothing() {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        let stage = video_stage(&queue, &store);

        assert_eq!(stage.fetch_next().unwrap(), None);
        assert!(queue.items(VIDEO_QUEUES.wip).is_empty());
    }

    #[test]
    fn test_fetch_moves_item_to_wip() {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        store.insert_video(7, VideoStatus::Queued);
        let stage = video_stage(&queue, &store);

        queue.push(VIDEO_QUEUES.origin, 7).unwrap();
        assert_eq!(stage.fetch_next().unwrap(), Some(7));
        assert!(queue.items(VIDEO_QUEUES.origin).is_empty());
        assert_eq!(queue.items(VIDEO_QUEUES.wip), vec![7]);
    }

    #[test]
    fn test_escalate_without_acknowledge_marks_video_failed() {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        store.insert_video(7, VideoStatus::Queued);
        let stage = video_stage(&queue, &store);

        queue.push(VIDEO_QUEUES.origin, 7).unwrap();
        stage.fetch_next().unwrap();
        stage.escalate().unwrap();

        assert!(queue.items(VIDEO_QUEUES.wip).is_empty());
        assert_eq!(queue.items(VIDEO_QUEUES.error), vec![7]);
        assert_eq!(store.video(7).status, VideoStatus::Error);
    }

    #[test]
    fn test_escalate_with_empty_wip_is_an_error() {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        let stage = video_stage(&queue, &store);

        assert!(stage.escalate().is_err());
    }

    #[test]
    fn test_acknowledge_removes_oldest_wip_entry() {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        let stage = video_stage(&queue, &store);

        queue.push(VIDEO_QUEUES.origin, 1).unwrap();
        queue.push(VIDEO_QUEUES.origin, 2).unwrap();
        stage.fetch_next().unwrap();
        stage.fetch_next().unwrap();
        assert_eq!(queue.items(VIDEO_QUEUES.wip), vec![1, 2]);

        stage.acknowledge().unwrap();
        assert_eq!(queue.items(VIDEO_QUEUES.wip), vec![2]);
    }

    #[test]
    fn test_escalate_marks_measurement_for_prediction_stage() {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        store.insert_video(1, VideoStatus::Optimized);
        store.insert_measurement(11, 1, crate::entities::MeasurementStatus::Queued);
        let stage = Stage::new(
            "predictor",
            MEASUREMENT_QUEUES,
            StageKind::Measurement,
            &queue,
            &store,
        );

        queue.push(MEASUREMENT_QUEUES.origin, 11).unwrap();
        stage.fetch_next().unwrap();
        stage.escalate().unwrap();

        assert_eq!(queue.items(MEASUREMENT_QUEUES.error), vec![11]);
        assert_eq!(
            store.measurement(11).status,
            crate::entities::MeasurementStatus::Error
        );
    }

    #[test]
    fn test_worker_processes_and_acknowledges_items_in_order() {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        let stage = video_stage(&queue, &store);

        queue.push(VIDEO_QUEUES.origin, 1).unwrap();
        queue.push(VIDEO_QUEUES.origin, 2).unwrap();
        queue.push(VIDEO_QUEUES.origin, 3).unwrap();

        let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded::<()>(0);
        let mut shutdown_tx = Some(shutdown_tx);
        let mut processed = Vec::new();
        run_worker(
            &stage,
            Duration::from_millis(1),
            &shutdown_rx,
            |item| {
                processed.push(item);
                if processed.len() == 3 {
                    // dropping the sender ends the loop on the next poll
                    shutdown_tx.take();
                }
                Ok(())
            },
            |_| Ok(()),
        );

        assert_eq!(processed, vec![1, 2, 3]);
        assert!(queue.items(VIDEO_QUEUES.wip).is_empty());
        assert!(queue.items(VIDEO_QUEUES.error).is_empty());
    }

    #[test]
    fn test_worker_escalates_failures_and_keeps_running() {
        let queue = MemoryQueue::new();
        let store = MemoryStore::new();
        store.insert_video(1, VideoStatus::Queued);
        store.insert_video(2, VideoStatus::Queued);
        let stage = video_stage(&queue, &store);

        queue.push(VIDEO_QUEUES.origin, 1).unwrap();
        queue.push(VIDEO_QUEUES.origin, 2).unwrap();

        let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded::<()>(0);
        let mut shutdown_tx = Some(shutdown_tx);
        let mut attempts = 0;
        run_worker(
            &stage,
            Duration::from_millis(1),
            &shutdown_rx,
            |item| {
                attempts += 1;
                if item == 1 {
                    Err(StageError::precondition("video has no source url"))
                } else {
                    Ok(())
                }
            },
            |_| {
                shutdown_tx.take();
                Ok(())
            },
        );

        assert_eq!(attempts, 2);
        assert_eq!(queue.items(VIDEO_QUEUES.error), vec![1]);
        assert_eq!(store.video(1).status, VideoStatus::Error);
        assert_eq!(store.video(2).status, VideoStatus::Queued);
    }
}
