use anyhow::{anyhow, Result};
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::VideoWriter;
use std::path::Path;

/// Frame-by-frame mp4 writer. The raw output is encoded with `mp4v`;
/// a container pass (see [`transcoder::normalize_container`]) produces
/// the final web-playable artifact.
///
/// [`transcoder::normalize_container`]: super::transcoder::normalize_container
pub struct VideoSink {
    writer: VideoWriter,
    frames_written: u64,
}

impl VideoSink {
    pub fn create(path: &Path, width: i32, height: i32, fps: f64) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non-UTF8 output path: {:?}", path))?;
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(path_str, fourcc, fps, Size::new(width, height), true)?;
        if !writer.is_opened()? {
            return Err(anyhow!("Failed to open video writer for {}", path_str));
        }

        Ok(Self {
            writer,
            frames_written: 0,
        })
    }

    pub fn write(&mut self, frame: &Mat) -> Result<()> {
        self.writer.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush and close the writer, returning the number of frames written.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.release()?;
        Ok(self.frames_written)
    }
}
