// Multi-class line-crossing counting engine.
//
// One LineCounter per allowed class plus a global one, all bound to the
// same absolute line. A crossing is the center of a tracked object
// switching sides of the line; the tracker id keys the side state so a
// crossing is counted exactly once. An object that re-enters with a
// fresh tracker id counts as a new object.

use crate::entities::Detection;
use crate::model::TrackedDetection;
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap};

/// Counting line as stored on a measurement: two points normalized to
/// [0,1] x [0,1], scaled to pixels against the processed video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSpec {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LineSpec {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        for value in [x1, y1, x2, y2] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("Line coordinate {} outside [0, 1]", value));
            }
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Scale into absolute pixel coordinates for a frame of the given
    /// dimensions.
    pub fn scale(&self, width: i32, height: i32) -> CrossingLine {
        CrossingLine {
            start: ((self.x1 * width as f64) as i32, (self.y1 * height as f64) as i32),
            end: ((self.x2 * width as f64) as i32, (self.y2 * height as f64) as i32),
        }
    }
}

/// Absolute-pixel counting line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingLine {
    pub start: (i32, i32),
    pub end: (i32, i32),
}

impl CrossingLine {
    /// Which side of the line a point falls on: the sign of the cross
    /// product of the line direction with the point offset. 0 means
    /// exactly on the line.
    fn side_of(&self, point: (f32, f32)) -> i8 {
        let (sx, sy) = (self.start.0 as f64, self.start.1 as f64);
        let (ex, ey) = (self.end.0 as f64, self.end.1 as f64);
        let cross = (ex - sx) * (point.1 as f64 - sy) - (ey - sy) * (point.0 as f64 - sx);
        if cross > 0.0 {
            1
        } else if cross < 0.0 {
            -1
        } else {
            0
        }
    }
}

/// Directional crossing tally for one line. Holds the last observed
/// side per tracker id; a side switch increments exactly one direction.
#[derive(Debug)]
pub struct LineCounter {
    line: CrossingLine,
    last_side: HashMap<u64, i8>,
    in_count: u64,
    out_count: u64,
}

impl LineCounter {
    pub fn new(line: CrossingLine) -> Self {
        Self {
            line,
            last_side: HashMap::new(),
            in_count: 0,
            out_count: 0,
        }
    }

    pub fn update(&mut self, detections: &[&TrackedDetection]) {
        for detection in detections {
            // untracked boxes cannot produce a transition
            let Some(tracker_id) = detection.tracker_id else {
                continue;
            };

            let side = self.line.side_of(detection.bbox.center());
            if side == 0 {
                // exactly on the line: wait for a definite side
                continue;
            }

            match self.last_side.insert(tracker_id, side) {
                Some(previous) if previous != side => {
                    if side > 0 {
                        self.in_count += 1;
                    } else {
                        self.out_count += 1;
                    }
                }
                _ => {}
            }
        }
    }

    pub fn in_count(&self) -> u64 {
        self.in_count
    }

    pub fn out_count(&self) -> u64 {
        self.out_count
    }

    pub fn total(&self) -> u64 {
        self.in_count + self.out_count
    }
}

/// Aggregated result of one counting run.
#[derive(Debug, Clone, PartialEq)]
pub struct CountingSummary {
    /// Per-class stats, classes with zero crossings omitted.
    pub classes: Vec<Detection>,
    pub global_count: i64,
    pub global_frequency: f64,
}

pub struct CountingEngine {
    allowed: Vec<u16>,
    confidence_threshold: f32,
    global: LineCounter,
    per_class: BTreeMap<u16, LineCounter>,
}

impl CountingEngine {
    pub fn new(line: CrossingLine, allowed_classes: &[u16], confidence_threshold: f32) -> Self {
        Self {
            allowed: allowed_classes.to_vec(),
            confidence_threshold,
            global: LineCounter::new(line),
            per_class: allowed_classes
                .iter()
                .map(|&class_id| (class_id, LineCounter::new(line)))
                .collect(),
        }
    }

    /// Feed one frame's detections. Filters to the allowed classes above
    /// the confidence threshold, updates the global counter with the
    /// whole filtered set and each class counter with its subset.
    /// Returns the filtered detections for annotation.
    pub fn observe<'a>(&mut self, detections: &'a [TrackedDetection]) -> Vec<&'a TrackedDetection> {
        let filtered: Vec<&TrackedDetection> = detections
            .iter()
            .filter(|d| self.allowed.contains(&d.class_id) && d.confidence > self.confidence_threshold)
            .collect();

        self.global.update(&filtered);
        for (class_id, counter) in self.per_class.iter_mut() {
            let class_detections: Vec<&TrackedDetection> = filtered
                .iter()
                .copied()
                .filter(|d| d.class_id == *class_id)
                .collect();
            counter.update(&class_detections);
        }

        filtered
    }

    pub fn global_counts(&self) -> (u64, u64) {
        (self.global.in_count(), self.global.out_count())
    }

    /// Roll the counters up into persistable statistics. Classes that
    /// never crossed are omitted; the global count comes from the global
    /// counter, not the per-class sum.
    pub fn summarize(
        &self,
        duration_seconds: i64,
        mut class_name: impl FnMut(u16) -> Option<String>,
    ) -> CountingSummary {
        let classes = self
            .per_class
            .iter()
            .filter(|(_, counter)| counter.total() > 0)
            .map(|(&class_id, counter)| {
                let name = class_name(class_id)
                    .map(|name| name.to_uppercase())
                    .unwrap_or_else(|| format!("CLASS_{}", class_id));
                Detection {
                    class_name: name,
                    count: counter.total() as i64,
                    frequency: counter.total() as f64 / duration_seconds as f64,
                }
            })
            .collect();

        let global_count = self.global.total() as i64;
        CountingSummary {
            classes,
            global_count,
            global_frequency: global_count as f64 / duration_seconds as f64,
        }
    }
}
