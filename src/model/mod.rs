// Detection-and-tracking model boundary.
//
// The pipeline only depends on the TrackingModel trait: a lazy stream of
// frames with per-object tracker ids. The shipped implementation pairs
// an RT-DETR detector with a greedy IoU tracker; tests substitute
// scripted models.

pub mod detector;
pub mod tracker;

use crate::video::opencv_reader::OpencvReader;
use anyhow::Result;
use detector::ObjectDetector;
use opencv::core::Mat;
use tracker::IouTracker;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.w).min(other.x + other.w);
        let bottom = (self.y + self.h).min(other.y + other.h);

        let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }
}

/// One detected object in one frame. `tracker_id` is stable across
/// frames for the same physical object while the tracker can follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDetection {
    pub bbox: BBox,
    pub class_id: u16,
    pub confidence: f32,
    pub tracker_id: Option<u64>,
}

/// One decoded frame with its tracked detections.
pub struct TrackedFrame {
    pub image: Mat,
    pub detections: Vec<TrackedDetection>,
}

/// Black-box detection and tracking over a video source. The stream is
/// not restartable: a new `track` call re-decodes from the start with
/// fresh tracker state.
pub trait TrackingModel: Send {
    fn track<'a>(
        &'a mut self,
        source: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<TrackedFrame>> + 'a>>;

    fn class_name(&self, class_id: u16) -> Option<String>;
}

/// Production model: RT-DETR detections associated across frames by IoU.
pub struct TrackingPipeline {
    detector: ObjectDetector,
    iou_threshold: f32,
    max_missing: u32,
}

impl TrackingPipeline {
    /// Association defaults: a detection continues a track at IoU >= 0.3;
    /// a track survives up to 30 undetected frames.
    pub fn new(detector: ObjectDetector) -> Self {
        Self {
            detector,
            iou_threshold: 0.3,
            max_missing: 30,
        }
    }
}

impl TrackingModel for TrackingPipeline {
    fn track<'a>(
        &'a mut self,
        source: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<TrackedFrame>> + 'a>> {
        let reader = OpencvReader::open(source)?;
        Ok(Box::new(TrackStream {
            reader,
            detector: &mut self.detector,
            tracker: IouTracker::new(self.iou_threshold, self.max_missing),
        }))
    }

    fn class_name(&self, class_id: u16) -> Option<String> {
        self.detector.class_name(class_id)
    }
}

struct TrackStream<'a> {
    reader: OpencvReader,
    detector: &'a mut ObjectDetector,
    tracker: IouTracker,
}

impl Iterator for TrackStream<'_> {
    type Item = Result<TrackedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = match self.reader.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            // a bad frame is an item-level error the consumer may skip
            Err(error) => return Some(Err(error)),
        };

        let mut detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(error) => return Some(Err(error)),
        };
        self.tracker.assign(&mut detections);

        Some(Ok(TrackedFrame {
            image: frame,
            detections,
        }))
    }
}
