// In-memory fakes for the external collaborators, shared by the unit
// tests: queue, entity store, object storage and a scripted model.

use crate::entities::{
    Detection, Measurement, MeasurementStatus, MeasurementUpdate, Video, VideoStatus, VideoUpdate,
};
use crate::model::{TrackedDetection, TrackedFrame, TrackingModel};
use crate::queue::{TaskQueue, WorkItem};
use crate::service::VideoStore;
use crate::storage::ObjectStorage;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct MemoryQueue {
    lists: Mutex<BTreeMap<String, VecDeque<WorkItem>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(BTreeMap::new()),
        }
    }

    /// Snapshot of a list, oldest first.
    pub fn items(&self, queue: &str) -> Vec<WorkItem> {
        self.lists
            .lock()
            .unwrap()
            .get(queue)
            .map(|list| list.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl TaskQueue for MemoryQueue {
    fn push(&self, queue: &str, item: WorkItem) -> Result<()> {
        self.lists
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push_back(item);
        Ok(())
    }

    fn transfer(&self, from: &str, to: &str) -> Result<Option<WorkItem>> {
        let mut lists = self.lists.lock().unwrap();
        let item = lists.get_mut(from).and_then(VecDeque::pop_front);
        if let Some(item) = item {
            lists.entry(to.to_string()).or_default().push_back(item);
        }
        Ok(item)
    }

    fn pop(&self, queue: &str) -> Result<Option<WorkItem>> {
        Ok(self
            .lists
            .lock()
            .unwrap()
            .get_mut(queue)
            .and_then(VecDeque::pop_front))
    }
}

pub struct MemoryStore {
    videos: Mutex<BTreeMap<i64, Video>>,
    measurements: Mutex<BTreeMap<i64, Measurement>>,
    detections: Mutex<Vec<(i64, Detection)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            videos: Mutex::new(BTreeMap::new()),
            measurements: Mutex::new(BTreeMap::new()),
            detections: Mutex::new(Vec::new()),
        }
    }

    pub fn insert_video(&self, id: i64, status: VideoStatus) -> Video {
        let video = Video {
            id,
            name: format!("video-{}", id),
            status,
            uploaded_at: Utc::now(),
            input_video_url: None,
            width: None,
            height: None,
            fps: None,
            total_frames: None,
            duration: None,
            optimized_s3_key: None,
            optimized_video_url: None,
            optimized_fps_ratio: None,
            measurements: Vec::new(),
        };
        self.videos.lock().unwrap().insert(id, video.clone());
        video
    }

    pub fn insert_measurement(&self, id: i64, video_id: i64, status: MeasurementStatus) -> Measurement {
        let measurement = Measurement {
            id,
            video_id,
            name: format!("measurement-{}", id),
            status,
            created_at: Utc::now(),
            x1: Some(0.5),
            y1: Some(0.0),
            x2: Some(0.5),
            y2: Some(1.0),
            output_s3_key: None,
            detections_count: None,
            global_frequency: None,
        };
        self.measurements
            .lock()
            .unwrap()
            .insert(id, measurement.clone());
        measurement
    }

    pub fn put_video(&self, video: Video) {
        self.videos.lock().unwrap().insert(video.id, video);
    }

    pub fn put_measurement(&self, measurement: Measurement) {
        self.measurements
            .lock()
            .unwrap()
            .insert(measurement.id, measurement);
    }

    pub fn video(&self, id: i64) -> Video {
        self.videos.lock().unwrap()[&id].clone()
    }

    pub fn measurement(&self, id: i64) -> Measurement {
        self.measurements.lock().unwrap()[&id].clone()
    }

}

impl VideoStore for MemoryStore {
    fn get_video(&self, video_id: i64) -> Result<Video> {
        let mut video = self
            .videos
            .lock()
            .unwrap()
            .get(&video_id)
            .cloned()
            .ok_or_else(|| anyhow!("video {} not found", video_id))?;
        video.measurements = self
            .measurements
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.video_id == video_id)
            .cloned()
            .collect();
        Ok(video)
    }

    fn update_video(&self, video_id: i64, params: &VideoUpdate) -> Result<Video> {
        let mut videos = self.videos.lock().unwrap();
        let video = videos
            .get_mut(&video_id)
            .ok_or_else(|| anyhow!("video {} not found", video_id))?;
        if let Some(status) = params.status {
            video.status = status;
        }
        if params.width.is_some() {
            video.width = params.width;
        }
        if params.height.is_some() {
            video.height = params.height;
        }
        if params.fps.is_some() {
            video.fps = params.fps;
        }
        if params.total_frames.is_some() {
            video.total_frames = params.total_frames;
        }
        if params.duration.is_some() {
            video.duration = params.duration;
        }
        if params.optimized_s3_key.is_some() {
            video.optimized_s3_key = params.optimized_s3_key.clone();
        }
        if params.optimized_fps_ratio.is_some() {
            video.optimized_fps_ratio = params.optimized_fps_ratio;
        }
        Ok(video.clone())
    }

    fn get_measurement(&self, measurement_id: i64) -> Result<Measurement> {
        self.measurements
            .lock()
            .unwrap()
            .get(&measurement_id)
            .cloned()
            .ok_or_else(|| anyhow!("measurement {} not found", measurement_id))
    }

    fn update_measurement(
        &self,
        measurement_id: i64,
        params: &MeasurementUpdate,
    ) -> Result<Measurement> {
        let mut measurements = self.measurements.lock().unwrap();
        let measurement = measurements
            .get_mut(&measurement_id)
            .ok_or_else(|| anyhow!("measurement {} not found", measurement_id))?;
        if let Some(status) = params.status {
            measurement.status = status;
        }
        if params.output_s3_key.is_some() {
            measurement.output_s3_key = params.output_s3_key.clone();
        }
        if params.detections_count.is_some() {
            measurement.detections_count = params.detections_count;
        }
        if params.global_frequency.is_some() {
            measurement.global_frequency = params.global_frequency;
        }
        Ok(measurement.clone())
    }

    fn create_detection(&self, measurement_id: i64, detection: &Detection) -> Result<()> {
        self.detections
            .lock()
            .unwrap()
            .push((measurement_id, detection.clone()));
        Ok(())
    }
}

pub struct MemoryStorage {
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
        }
    }
}

impl ObjectStorage for MemoryStorage {
    fn put_presigned_url(&self, key: &str) -> Result<String> {
        Ok(format!("memory://put/{}", key))
    }

    fn get_presigned_url(&self, key: &str) -> Result<String> {
        Ok(format!("memory://get/{}", key))
    }

    fn upload_file(&self, local_path: &Path, key: &str) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), key.to_string()));
        Ok(())
    }
}

/// Scripted model: replays canned per-frame detections over blank
/// frames and never touches the source.
pub struct ScriptedModel {
    frames: Vec<Vec<TrackedDetection>>,
    names: BTreeMap<u16, String>,
}

impl ScriptedModel {
    pub fn new(frames: Vec<Vec<TrackedDetection>>, names: &[(u16, &str)]) -> Self {
        Self {
            frames,
            names: names
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), &[])
    }
}

impl TrackingModel for ScriptedModel {
    fn track<'a>(
        &'a mut self,
        _source: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<TrackedFrame>> + 'a>> {
        let frames = self.frames.clone();
        Ok(Box::new(frames.into_iter().map(
            |detections| -> Result<TrackedFrame> {
                let image = opencv::core::Mat::new_rows_cols_with_default(
                    64,
                    64,
                    opencv::core::CV_8UC3,
                    opencv::core::Scalar::all(0.0),
                )?;
                Ok(TrackedFrame { image, detections })
            },
        )))
    }

    fn class_name(&self, class_id: u16) -> Option<String> {
        self.names.get(&class_id).cloned()
    }
}
