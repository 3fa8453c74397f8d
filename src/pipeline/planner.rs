// Normalization planner: maps source video metrics to the transcode
// strategy that brings the video inside the resolution/frame-rate
// envelope.

use crate::video::VideoMetrics;

/// The transcode plan for one source video, with the parameters needed
/// to execute it. `fps_factor` is the target/source frame-rate ratio and
/// is only present when frames are dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeStrategy {
    Copy,
    Rescale {
        width: i32,
        height: i32,
    },
    DecimateFps {
        fps_factor: f64,
    },
    DecimateFpsRescale {
        width: i32,
        height: i32,
        fps_factor: f64,
    },
}

impl TranscodeStrategy {
    /// Output dimensions after executing this strategy.
    pub fn output_size(&self, metrics: &VideoMetrics) -> (i32, i32) {
        match self {
            TranscodeStrategy::Copy | TranscodeStrategy::DecimateFps { .. } => {
                (metrics.width, metrics.height)
            }
            TranscodeStrategy::Rescale { width, height }
            | TranscodeStrategy::DecimateFpsRescale { width, height, .. } => (*width, *height),
        }
    }

    /// Output frame rate after executing this strategy.
    pub fn output_fps(&self, metrics: &VideoMetrics) -> f64 {
        match self.fps_factor() {
            Some(factor) => metrics.fps * factor,
            None => metrics.fps,
        }
    }

    pub fn fps_factor(&self) -> Option<f64> {
        match self {
            TranscodeStrategy::DecimateFps { fps_factor }
            | TranscodeStrategy::DecimateFpsRescale { fps_factor, .. } => Some(*fps_factor),
            _ => None,
        }
    }
}

/// Uniformly scale both dimensions so the shorter side lands on
/// `max_short_side` exactly. Multiplying before dividing keeps the
/// truncation from undershooting the target on common resolutions.
fn target_dimensions(metrics: &VideoMetrics, max_short_side: i32) -> (i32, i32) {
    let short_side = metrics.short_side() as f64;
    let width = (metrics.width as f64 * max_short_side as f64 / short_side) as i32;
    let height = (metrics.height as f64 * max_short_side as f64 / short_side) as i32;
    (width, height)
}

/// Decide how to normalize a video. Total over all metrics: every input
/// maps to exactly one strategy.
pub fn plan(metrics: &VideoMetrics, max_fps: f64, max_short_side: i32) -> TranscodeStrategy {
    let is_oversized = metrics.short_side() > max_short_side;
    let is_too_fast = metrics.fps > max_fps;

    match (is_oversized, is_too_fast) {
        (true, true) => {
            let (width, height) = target_dimensions(metrics, max_short_side);
            TranscodeStrategy::DecimateFpsRescale {
                width,
                height,
                fps_factor: max_fps / metrics.fps,
            }
        }
        (true, false) => {
            let (width, height) = target_dimensions(metrics, max_short_side);
            TranscodeStrategy::Rescale { width, height }
        }
        (false, true) => TranscodeStrategy::DecimateFps {
            fps_factor: max_fps / metrics.fps,
        },
        (false, false) => TranscodeStrategy::Copy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_FPS: f64 = 15.0;
    const MAX_SHORT_SIDE: i32 = 360;

    fn metrics(width: i32, height: i32, fps: f64) -> VideoMetrics {
        VideoMetrics::new(width, height, fps, 900)
    }

    #[test]
    fn test_within_envelope_is_copy() {
        for m in [
            metrics(640, 360, 15.0),
            metrics(360, 640, 12.5),
            metrics(320, 240, 10.0),
        ] {
            assert_eq!(plan(&m, MAX_FPS, MAX_SHORT_SIDE), TranscodeStrategy::Copy);
        }
    }

    #[test]
    fn test_oversized_only_rescales() {
        let strategy = plan(&metrics(1280, 720, 15.0), MAX_FPS, MAX_SHORT_SIDE);
        assert_eq!(
            strategy,
            TranscodeStrategy::Rescale {
                width: 640,
                height: 360
            }
        );
    }

    #[test]
    fn test_too_fast_only_decimates() {
        let strategy = plan(&metrics(640, 360, 30.0), MAX_FPS, MAX_SHORT_SIDE);
        assert_eq!(
            strategy,
            TranscodeStrategy::DecimateFps { fps_factor: 0.5 }
        );
    }

    #[test]
    fn test_oversized_and_too_fast_does_both() {
        let strategy = plan(&metrics(1920, 1080, 30.0), MAX_FPS, MAX_SHORT_SIDE);
        assert_eq!(
            strategy,
            TranscodeStrategy::DecimateFpsRescale {
                width: 640,
                height: 360,
                fps_factor: 0.5
            }
        );
    }

    #[test]
    fn test_short_side_lands_exactly_on_bound() {
        for m in [
            metrics(1920, 1080, 10.0),
            metrics(1080, 1920, 10.0),
            metrics(3840, 2160, 10.0),
            metrics(1280, 720, 10.0),
            metrics(720, 960, 10.0),
            metrics(1366, 768, 10.0),
        ] {
            let TranscodeStrategy::Rescale { width, height } = plan(&m, MAX_FPS, MAX_SHORT_SIDE)
            else {
                panic!("expected a rescale for {}x{}", m.width, m.height);
            };
            assert_eq!(width.min(height), MAX_SHORT_SIDE, "for {}x{}", m.width, m.height);

            // aspect ratio preserved within a pixel of truncation error
            let expected_long =
                m.width.max(m.height) as f64 * MAX_SHORT_SIDE as f64 / m.short_side() as f64;
            assert!(
                (width.max(height) as f64 - expected_long).abs() <= 1.0,
                "{}x{} -> {}x{}",
                m.width,
                m.height,
                width,
                height
            );
        }
    }

    #[test]
    fn test_portrait_keeps_orientation() {
        let strategy = plan(&metrics(1080, 1920, 10.0), MAX_FPS, MAX_SHORT_SIDE);
        assert_eq!(
            strategy,
            TranscodeStrategy::Rescale {
                width: 360,
                height: 640
            }
        );
    }

    #[test]
    fn test_output_fps_and_size_helpers() {
        let m = metrics(1920, 1080, 30.0);
        let strategy = plan(&m, MAX_FPS, MAX_SHORT_SIDE);
        assert_eq!(strategy.output_size(&m), (640, 360));
        assert_eq!(strategy.output_fps(&m), 15.0);
        assert_eq!(strategy.fps_factor(), Some(0.5));

        let copy = plan(&metrics(640, 360, 15.0), MAX_FPS, MAX_SHORT_SIDE);
        assert_eq!(copy.output_size(&m), (1920, 1080));
        assert_eq!(copy.output_fps(&m), 30.0);
        assert_eq!(copy.fps_factor(), None);
    }

    #[test]
    fn test_boundary_values_are_inside_envelope() {
        // equal to the bounds is not "over" the bounds
        assert_eq!(
            plan(&metrics(640, 360, 15.0), MAX_FPS, MAX_SHORT_SIDE),
            TranscodeStrategy::Copy
        );
    }
}
