use super::{BBox, TrackedDetection};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
struct Track {
    bbox: BBox,
    missing: u32,
}

/// Greedy IoU association tracker. Each frame, detections are matched
/// to existing tracks by descending IoU; matches inherit the track id,
/// leftovers mint fresh ids. A track that goes unmatched for more than
/// `max_missing` consecutive frames is dropped, so an object returning
/// later gets a new id.
pub struct IouTracker {
    tracks: HashMap<u64, Track>,
    next_id: u64,
    iou_threshold: f32,
    max_missing: u32,
}

impl IouTracker {
    pub fn new(iou_threshold: f32, max_missing: u32) -> Self {
        Self {
            tracks: HashMap::new(),
            next_id: 1,
            iou_threshold,
            max_missing,
        }
    }

    /// Assign tracker ids in place for one frame of detections.
    pub fn assign(&mut self, detections: &mut [TrackedDetection]) {
        let mut pairs: Vec<(f32, u64, usize)> = Vec::new();
        for (&track_id, track) in &self.tracks {
            for (index, detection) in detections.iter().enumerate() {
                let iou = track.bbox.iou(&detection.bbox);
                if iou >= self.iou_threshold {
                    pairs.push((iou, track_id, index));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let mut matched_tracks: HashSet<u64> = HashSet::new();
        let mut matched_detections: HashSet<usize> = HashSet::new();
        for (_, track_id, index) in pairs {
            if matched_tracks.contains(&track_id) || matched_detections.contains(&index) {
                continue;
            }
            if let Some(track) = self.tracks.get_mut(&track_id) {
                track.bbox = detections[index].bbox;
                track.missing = 0;
                detections[index].tracker_id = Some(track_id);
                matched_tracks.insert(track_id);
                matched_detections.insert(index);
            }
        }

        // unmatched tracks age, and expire past the miss bound
        self.tracks.retain(|track_id, track| {
            if matched_tracks.contains(track_id) {
                return true;
            }
            track.missing += 1;
            track.missing <= self.max_missing
        });

        // unmatched detections start new tracks
        for (index, detection) in detections.iter_mut().enumerate() {
            if matched_detections.contains(&index) {
                continue;
            }
            let track_id = self.next_id;
            self.next_id += 1;
            self.tracks.insert(
                track_id,
                Track {
                    bbox: detection.bbox,
                    missing: 0,
                },
            );
            detection.tracker_id = Some(track_id);
        }
    }
}
