pub mod opencv_reader;
pub mod sink;
pub mod transcoder;

use anyhow::Result;
use opencv_reader::OpencvReader;

/// Source-video measurements the normalization planner decides on.
/// Computed once per source path; `duration_seconds` is derived with
/// integer truncation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetrics {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    pub total_frames: i64,
    pub duration_seconds: i64,
}

impl VideoMetrics {
    pub fn new(width: i32, height: i32, fps: f64, total_frames: i64) -> Self {
        Self {
            width,
            height,
            fps,
            total_frames,
            duration_seconds: (total_frames as f64 / fps) as i64,
        }
    }

    pub fn short_side(&self) -> i32 {
        self.width.min(self.height)
    }
}

/// Open `source` and extract its metrics. Fails if the source cannot be
/// opened or reports unusable dimensions/frame rate.
pub fn probe(source: &str) -> Result<VideoMetrics> {
    OpencvReader::open(source)?.metrics()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_truncates() {
        let metrics = VideoMetrics::new(1280, 720, 30.0, 95);
        assert_eq!(metrics.duration_seconds, 3);

        let metrics = VideoMetrics::new(1280, 720, 25.0, 50);
        assert_eq!(metrics.duration_seconds, 2);
    }

    #[test]
    fn test_short_side() {
        assert_eq!(VideoMetrics::new(1920, 1080, 30.0, 1).short_side(), 1080);
        assert_eq!(VideoMetrics::new(720, 1280, 30.0, 1).short_side(), 720);
    }
}
