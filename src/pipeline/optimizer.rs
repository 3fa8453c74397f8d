// Optimization stage: probe an uploaded video, bring it inside the
// resolution/frame-rate envelope, upload the normalized artifact and
// queue any measurements that were waiting on it.

use crate::entities::{MeasurementStatus, MeasurementUpdate, VideoStatus, VideoUpdate};
use crate::pipeline::error::StageError;
use crate::pipeline::orchestrator::MEASUREMENT_QUEUES;
use crate::pipeline::planner;
use crate::queue::{TaskQueue, WorkItem};
use crate::service::VideoStore;
use crate::storage::{artifact_paths, generate_video_key, remove_artifacts, ObjectStorage};
use crate::video::{self, transcoder};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub struct Optimizer<'a> {
    store: &'a dyn VideoStore,
    storage: &'a dyn ObjectStorage,
    max_fps: f64,
    max_short_side: i32,
    work_dir: PathBuf,
}

impl<'a> Optimizer<'a> {
    pub fn new(
        store: &'a dyn VideoStore,
        storage: &'a dyn ObjectStorage,
        max_fps: f64,
        max_short_side: i32,
        work_dir: &Path,
    ) -> Self {
        Self {
            store,
            storage,
            max_fps,
            max_short_side,
            work_dir: work_dir.to_path_buf(),
        }
    }

    /// Normalize one video. Runs inside the optimization stage's worker
    /// loop; any error escalates the item.
    pub fn process(&self, video_id: WorkItem) -> Result<(), StageError> {
        let video = self
            .store
            .get_video(video_id)
            .map_err(|error| StageError::precondition(format!("video {}: {:#}", video_id, error)))?;
        let source = video
            .input_video_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                StageError::precondition(format!("video {} has no source url", video_id))
            })?
            .to_string();

        let metrics = video::probe(&source)
            .context("Video metadata could not be extracted")?;
        self.store.update_video(
            video_id,
            &VideoUpdate {
                status: Some(VideoStatus::Optimizing),
                width: Some(metrics.width),
                height: Some(metrics.height),
                fps: Some(metrics.fps),
                total_frames: Some(metrics.total_frames),
                duration: Some(metrics.duration_seconds),
                ..VideoUpdate::default()
            },
        )?;

        let strategy = planner::plan(&metrics, self.max_fps, self.max_short_side);
        tracing::info!("Video {}: strategy {:?}", video_id, strategy);

        let target_key = generate_video_key("optimized");
        let (raw_path, target_path) = artifact_paths(&self.work_dir, &target_key);

        let result = self.transcode_and_upload(&source, &strategy, &metrics, &raw_path,
            &target_path, &target_key, video_id);
        remove_artifacts(&[&raw_path, &target_path]);
        result?;
        Ok(())
    }

    fn transcode_and_upload(
        &self,
        source: &str,
        strategy: &planner::TranscodeStrategy,
        metrics: &video::VideoMetrics,
        raw_path: &Path,
        target_path: &Path,
        target_key: &str,
        video_id: WorkItem,
    ) -> Result<()> {
        let frames_written = transcoder::execute(source, strategy, metrics, raw_path)?;
        if frames_written == 0 {
            return Err(anyhow!("No frames could be read from {}", source));
        }

        transcoder::normalize_container(raw_path, target_path)?;
        self.store.update_video(
            video_id,
            &VideoUpdate {
                status: Some(VideoStatus::Optimized),
                optimized_s3_key: Some(target_key.to_string()),
                optimized_fps_ratio: Some(strategy.fps_factor().unwrap_or(1.0)),
                ..VideoUpdate::default()
            },
        )?;
        self.storage.upload_file(target_path, target_key)?;
        Ok(())
    }

    /// Fan out after a successful optimization: every measurement still
    /// in REQUESTED moves to QUEUED and enters the prediction queue.
    /// Guarding on the freshly read status keeps redelivery of the same
    /// video from queueing a measurement twice.
    pub fn enqueue_measurements(&self, queue: &dyn TaskQueue, video_id: WorkItem) -> Result<()> {
        let video = self.store.get_video(video_id)?;
        for measurement in &video.measurements {
            if measurement.status != MeasurementStatus::Requested {
                continue;
            }
            self.store.update_measurement(
                measurement.id,
                &MeasurementUpdate::status(MeasurementStatus::Queued),
            )?;
            queue.push(MEASUREMENT_QUEUES.origin, measurement.id)?;
            tracing::info!(
                "Video {}: queued measurement {} for prediction",
                video_id,
                measurement.id
            );
        }
        Ok(())
    }
}
