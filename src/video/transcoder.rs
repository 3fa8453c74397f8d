// Executes a transcode strategy by streaming frames from the source
// into a VideoSink, then normalizes the container with the external
// ffmpeg binary.

use super::opencv_reader::OpencvReader;
use super::sink::VideoSink;
use super::VideoMetrics;
use crate::pipeline::planner::TranscodeStrategy;
use anyhow::{anyhow, Context, Result};
use opencv::core::{Mat, Size};
use opencv::imgproc;
use std::path::Path;
use std::process::Command;

/// Frame-rate decimation gate. Feeding it every source frame in order,
/// it admits the nearest available frame for each output slot so the
/// admitted count tracks `source_frames * fps_factor` without knowing
/// the total in advance, and no output slot is ever filled twice.
#[derive(Debug)]
pub struct DecimationGate {
    fps_factor: f64,
    index_in: i64,
    index_out: i64,
}

impl DecimationGate {
    pub fn new(fps_factor: f64) -> Self {
        Self {
            fps_factor,
            index_in: -1,
            index_out: -1,
        }
    }

    /// Register the next source frame; returns whether it should be
    /// written to the output.
    pub fn admit(&mut self) -> bool {
        self.index_in += 1;
        let due = (self.index_in as f64 * self.fps_factor).floor() as i64;
        if due > self.index_out {
            self.index_out += 1;
            return true;
        }
        false
    }

    pub fn admitted(&self) -> i64 {
        self.index_out + 1
    }
}

fn resize(frame: &Mat, width: i32, height: i32) -> Result<Mat> {
    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}

/// Stream `source` through `strategy` into a raw mp4 at `target_path`.
/// Returns the number of frames written; writing zero frames is a
/// failure surfaced by the caller.
pub fn execute(
    source: &str,
    strategy: &TranscodeStrategy,
    metrics: &VideoMetrics,
    target_path: &Path,
) -> Result<u64> {
    let mut reader = OpencvReader::open(source)?;
    let (out_width, out_height) = strategy.output_size(metrics);
    let out_fps = strategy.output_fps(metrics);
    let mut sink = VideoSink::create(target_path, out_width, out_height, out_fps)?;

    tracing::info!(
        "Transcoding {} -> {:?} with {:?} ({}x{} @ {:.2} fps)",
        source,
        target_path,
        strategy,
        out_width,
        out_height,
        out_fps
    );

    match strategy {
        TranscodeStrategy::Copy => {
            while let Some(frame) = reader.read_frame()? {
                sink.write(&frame)?;
            }
        }
        TranscodeStrategy::Rescale { width, height } => {
            while let Some(frame) = reader.read_frame()? {
                sink.write(&resize(&frame, *width, *height)?)?;
            }
        }
        TranscodeStrategy::DecimateFps { fps_factor } => {
            let mut gate = DecimationGate::new(*fps_factor);
            while reader.grab()? {
                if !gate.admit() {
                    continue;
                }
                let Some(frame) = reader.retrieve()? else {
                    break;
                };
                sink.write(&frame)?;
            }
        }
        TranscodeStrategy::DecimateFpsRescale {
            width,
            height,
            fps_factor,
        } => {
            let mut gate = DecimationGate::new(*fps_factor);
            while reader.grab()? {
                if !gate.admit() {
                    continue;
                }
                let Some(frame) = reader.retrieve()? else {
                    break;
                };
                sink.write(&resize(&frame, *width, *height)?)?;
            }
        }
    }

    sink.finish()
}

/// Re-encode the raw artifact into a web-playable h264 mp4 with the
/// external ffmpeg tool, then verify the result is readable.
pub fn normalize_container(raw_path: &Path, target_path: &Path) -> Result<()> {
    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(raw_path)
        .arg("-vcodec")
        .arg("libx264")
        .arg("-f")
        .arg("mp4")
        .arg(target_path)
        .status()
        .context("Failed to launch ffmpeg")?;
    if !status.success() {
        return Err(anyhow!("ffmpeg exited with {} for {:?}", status, raw_path));
    }

    let target = target_path
        .to_str()
        .ok_or_else(|| anyhow!("Non-UTF8 output path: {:?}", target_path))?;
    super::probe(target)
        .with_context(|| format!("Container pass produced an unreadable file: {}", target))?;
    Ok(())
}
