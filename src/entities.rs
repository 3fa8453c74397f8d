// Entity records exchanged with the persistence API.
//
// Update payloads carry only the fields being changed: everything is
// Option-al and absent fields are skipped during serialization, so a
// PATCH never clobbers columns it did not mention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    Created,
    Queued,
    Optimizing,
    Optimized,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementStatus {
    Requested,
    Queued,
    Processing,
    Predicted,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub name: String,
    pub status: VideoStatus,
    pub uploaded_at: DateTime<Utc>,
    pub input_video_url: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub total_frames: Option<i64>,
    pub duration: Option<i64>,
    pub optimized_s3_key: Option<String>,
    pub optimized_video_url: Option<String>,
    pub optimized_fps_ratio: Option<f64>,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub id: i64,
    pub video_id: i64,
    pub name: String,
    pub status: MeasurementStatus,
    pub created_at: DateTime<Utc>,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
    pub output_s3_key: Option<String>,
    pub detections_count: Option<i64>,
    pub global_frequency: Option<f64>,
}

/// Per-class crossing statistics persisted for a finished measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub count: i64,
    pub frequency: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VideoUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimized_s3_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimized_fps_ratio: Option<f64>,
}

impl VideoUpdate {
    pub fn status(status: VideoStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MeasurementUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MeasurementStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_s3_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detections_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_frequency: Option<f64>,
}

impl MeasurementUpdate {
    pub fn status(status: MeasurementStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
