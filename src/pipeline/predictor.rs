// Prediction stage: run detection and tracking over a normalized video,
// count line crossings per class, render the annotated artifact and
// persist the statistics.

use crate::entities::{Measurement, MeasurementStatus, MeasurementUpdate};
use crate::model::{TrackedDetection, TrackingModel};
use crate::pipeline::counting::{CountingEngine, CrossingLine, LineSpec};
use crate::pipeline::error::StageError;
use crate::queue::WorkItem;
use crate::service::VideoStore;
use crate::storage::{artifact_paths, generate_video_key, remove_artifacts, ObjectStorage};
use crate::video::sink::VideoSink;
use crate::video::{self, transcoder};
use anyhow::{anyhow, Context, Result};
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct Predictor<'a> {
    store: &'a dyn VideoStore,
    storage: &'a dyn ObjectStorage,
    model: Box<dyn TrackingModel>,
    allowed_classes: Vec<u16>,
    confidence_threshold: f32,
    work_dir: PathBuf,
}

impl<'a> Predictor<'a> {
    pub fn new(
        store: &'a dyn VideoStore,
        storage: &'a dyn ObjectStorage,
        model: Box<dyn TrackingModel>,
        allowed_classes: &[u16],
        confidence_threshold: f32,
        work_dir: &Path,
    ) -> Self {
        Self {
            store,
            storage,
            model,
            allowed_classes: allowed_classes.to_vec(),
            confidence_threshold,
            work_dir: work_dir.to_path_buf(),
        }
    }

    /// Count crossings for one measurement. Runs inside the prediction
    /// stage's worker loop; any error escalates the item.
    pub fn process(&mut self, measurement_id: WorkItem) -> Result<(), StageError> {
        let measurement = self.store.get_measurement(measurement_id).map_err(|error| {
            StageError::precondition(format!("measurement {}: {:#}", measurement_id, error))
        })?;
        let line = line_spec(&measurement)?;

        let video = self.store.get_video(measurement.video_id).map_err(|error| {
            StageError::precondition(format!("video {}: {:#}", measurement.video_id, error))
        })?;
        let duration = video
            .duration
            .filter(|&seconds| seconds > 0)
            .ok_or_else(|| {
                StageError::precondition(format!("video {} has no duration", video.id))
            })?;
        let source = self.resolve_source(&video)?;

        self.store.update_measurement(
            measurement_id,
            &MeasurementUpdate::status(MeasurementStatus::Processing),
        )?;

        let metrics = video::probe(&source)?;
        let crossing_line = line.scale(metrics.width, metrics.height);

        let target_key = generate_video_key("output");
        let (raw_path, target_path) = artifact_paths(&self.work_dir, &target_key);

        let result = self.count_and_publish(
            measurement_id,
            &source,
            crossing_line,
            duration,
            &metrics,
            &raw_path,
            &target_path,
            &target_key,
        );
        remove_artifacts(&[&raw_path, &target_path]);
        result?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn count_and_publish(
        &mut self,
        measurement_id: WorkItem,
        source: &str,
        crossing_line: CrossingLine,
        duration: i64,
        metrics: &video::VideoMetrics,
        raw_path: &Path,
        target_path: &Path,
        target_key: &str,
    ) -> Result<()> {
        // the stream holds the model borrow, so resolve names up front
        let class_names: HashMap<u16, String> = self
            .allowed_classes
            .iter()
            .filter_map(|&id| self.model.class_name(id).map(|name| (id, name)))
            .collect();

        let mut engine = CountingEngine::new(
            crossing_line,
            &self.allowed_classes,
            self.confidence_threshold,
        );
        let mut sink = VideoSink::create(raw_path, metrics.width, metrics.height, metrics.fps)?;
        let mut skipped_frames = 0u64;

        for item in self.model.track(source)? {
            // a failed frame is skipped with counters intact; only the
            // stream itself failing to open aborts the run
            let mut frame = match item {
                Ok(frame) => frame,
                Err(error) => {
                    skipped_frames += 1;
                    tracing::debug!("Skipping undecodable frame: {:#}", error);
                    continue;
                }
            };

            let counted = engine.observe(&frame.detections);
            if let Err(error) = annotate_frame(
                &mut frame.image,
                &counted,
                &class_names,
                &crossing_line,
                engine.global_counts(),
            )
            .and_then(|()| sink.write(&frame.image))
            {
                skipped_frames += 1;
                tracing::warn!("Skipping frame after annotation failure: {:#}", error);
            }
        }

        if skipped_frames > 0 {
            tracing::warn!(
                "Measurement {}: skipped {} frames",
                measurement_id,
                skipped_frames
            );
        }
        let frames_written = sink.finish()?;
        if frames_written == 0 {
            return Err(anyhow!("No frames could be read from {}", source));
        }

        transcoder::normalize_container(raw_path, target_path)?;
        self.storage.upload_file(target_path, target_key)?;

        let summary = engine.summarize(duration, |id| class_names.get(&id).cloned());
        for class_stats in &summary.classes {
            self.store.create_detection(measurement_id, class_stats)?;
        }
        self.store.update_measurement(
            measurement_id,
            &MeasurementUpdate {
                status: Some(MeasurementStatus::Predicted),
                output_s3_key: Some(target_key.to_string()),
                detections_count: Some(summary.global_count),
                global_frequency: Some(summary.global_frequency),
            },
        )?;

        tracing::info!(
            "Measurement {}: {} crossings over {} classes",
            measurement_id,
            summary.global_count,
            summary.classes.len()
        );
        Ok(())
    }

    /// The normalized video to analyse: the stored URL when the record
    /// carries one, otherwise a fresh presigned URL for its key.
    fn resolve_source(&self, video: &crate::entities::Video) -> Result<String, StageError> {
        if let Some(url) = video
            .optimized_video_url
            .as_deref()
            .filter(|url| !url.is_empty())
        {
            return Ok(url.to_string());
        }
        let key = video.optimized_s3_key.as_deref().ok_or_else(|| {
            StageError::precondition(format!("video {} has not been optimized", video.id))
        })?;
        Ok(self
            .storage
            .get_presigned_url(key)
            .context("Failed to presign the optimized video")?)
    }
}

fn line_spec(measurement: &Measurement) -> Result<LineSpec, StageError> {
    match (measurement.x1, measurement.y1, measurement.x2, measurement.y2) {
        (Some(x1), Some(y1), Some(x2), Some(y2)) => LineSpec::new(x1, y1, x2, y2)
            .map_err(|error| StageError::precondition(format!("{:#}", error))),
        _ => Err(StageError::precondition(format!(
            "measurement {} has no counting line",
            measurement.id
        ))),
    }
}

/// Burn the counting overlay into a frame: counted boxes with
/// `{tracker} {class} {confidence}` labels, the line and its running
/// totals.
fn annotate_frame(
    frame: &mut Mat,
    counted: &[&TrackedDetection],
    class_names: &HashMap<u16, String>,
    line: &CrossingLine,
    (in_count, out_count): (u64, u64),
) -> Result<()> {
    let box_color = Scalar::new(0.0, 255.0, 0.0, 0.0);
    let line_color = Scalar::new(0.0, 165.0, 255.0, 0.0);
    let text_color = Scalar::new(255.0, 255.0, 255.0, 0.0);

    for detection in counted {
        let rect = Rect::new(
            detection.bbox.x as i32,
            detection.bbox.y as i32,
            detection.bbox.w as i32,
            detection.bbox.h as i32,
        );
        imgproc::rectangle(frame, rect, box_color, 1, imgproc::LINE_8, 0)?;

        let class_label = class_names
            .get(&detection.class_id)
            .map(String::as_str)
            .unwrap_or("object");
        let label = match detection.tracker_id {
            Some(tracker_id) => {
                format!("{} {} {:.2}", tracker_id, class_label, detection.confidence)
            }
            None => format!("{} {:.2}", class_label, detection.confidence),
        };
        imgproc::put_text(
            frame,
            &label,
            Point::new(rect.x, (rect.y - 4).max(12)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            text_color,
            1,
            imgproc::LINE_8,
            false,
        )?;
    }

    let start = Point::new(line.start.0, line.start.1);
    let end = Point::new(line.end.0, line.end.1);
    imgproc::line(frame, start, end, line_color, 2, imgproc::LINE_8, 0)?;

    let tally = format!("in: {}  out: {}", in_count, out_count);
    let anchor = Point::new((start.x + end.x) / 2 + 8, (start.y + end.y) / 2 - 8);
    imgproc::put_text(
        frame,
        &tally,
        anchor,
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        line_color,
        1,
        imgproc::LINE_8,
        false,
    )?;

    Ok(())
}
