use super::VideoMetrics;
use anyhow::{anyhow, Result};
use opencv::{
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH},
};

/// Sequential frame reader over a local path or presigned URL.
pub struct OpencvReader {
    capture: VideoCapture,
    source: String,
}

impl OpencvReader {
    pub fn open(source: &str) -> Result<Self> {
        let capture = VideoCapture::from_file(source, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open video source: {}", source));
        }

        Ok(Self {
            capture,
            source: source.to_string(),
        })
    }

    pub fn metrics(&self) -> Result<VideoMetrics> {
        let width = self.capture.get(CAP_PROP_FRAME_WIDTH)? as i32;
        let height = self.capture.get(CAP_PROP_FRAME_HEIGHT)? as i32;
        let fps = self.capture.get(CAP_PROP_FPS)?;
        let total_frames = self.capture.get(CAP_PROP_FRAME_COUNT)? as i64;

        if width <= 0 || height <= 0 || fps <= 0.0 {
            return Err(anyhow!(
                "Video metadata could not be extracted from {} ({}x{} @ {:.2} fps)",
                self.source,
                width,
                height,
                fps
            ));
        }

        tracing::info!(
            "Opened {}: {}x{} @ {:.2} fps, {} frames",
            self.source,
            width,
            height,
            fps,
            total_frames
        );
        Ok(VideoMetrics::new(width, height, fps, total_frames))
    }

    /// Decode the next frame. `None` marks end of stream.
    pub fn read_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    /// Advance to the next frame without decoding it. Pair with
    /// [`retrieve`](Self::retrieve) to decode only the frames that are
    /// actually kept.
    pub fn grab(&mut self) -> Result<bool> {
        Ok(self.capture.grab()?)
    }

    /// Decode the last grabbed frame. `None` marks a decode failure at
    /// end of stream.
    pub fn retrieve(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let success = self.capture.retrieve(&mut frame, 0)?;
        if !success || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}
