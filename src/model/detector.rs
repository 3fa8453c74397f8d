use super::{BBox, TrackedDetection};
use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageBuffer, Rgb};
use opencv::core::Mat;
use opencv::prelude::*;
use usls::models::RTDETR;
use usls::{Config, Image};

/// RT-DETR wrapper that feeds OpenCV BGR frames to the model and maps
/// its horizontal boxes into pipeline detections.
pub struct ObjectDetector {
    model: RTDETR,
}

impl ObjectDetector {
    pub fn new(model_path: &str) -> Result<Self> {
        let config = Config::default()
            .with_model_file(model_path)
            .with_class_names(&usls::NAMES_COCO_80);

        #[cfg(target_os = "macos")]
        let config = config.with_model_device(usls::Device::CoreMl);

        let config = config.commit()?;
        let model = RTDETR::new(config)?;

        tracing::info!("Loaded detection model from {}", model_path);
        Ok(Self { model })
    }

    /// Run detection on a single frame. Tracker ids are assigned later
    /// by the caller's tracker.
    pub fn detect(&mut self, frame: &Mat) -> Result<Vec<TrackedDetection>> {
        let image = mat_to_image(frame)?;
        let results = self.model.forward(&[image])?;

        let hbbs = results
            .into_iter()
            .next()
            .map(|y| y.hbbs)
            .unwrap_or_default();

        Ok(hbbs
            .into_iter()
            .map(|hbb| TrackedDetection {
                bbox: BBox {
                    x: hbb.xmin(),
                    y: hbb.ymin(),
                    w: hbb.width(),
                    h: hbb.height(),
                },
                class_id: hbb.id().unwrap_or(0) as u16,
                confidence: hbb.confidence().unwrap_or(0.0),
                tracker_id: None,
            })
            .collect())
    }

    pub fn class_name(&self, class_id: u16) -> Option<String> {
        usls::NAMES_COCO_80
            .get(class_id as usize)
            .map(|name| name.to_string())
    }
}

/// Convert an OpenCV Mat (BGR) to a usls input image (RGB).
fn mat_to_image(mat: &Mat) -> Result<Image> {
    let mut rgb_mat = Mat::default();
    opencv::imgproc::cvt_color_def(mat, &mut rgb_mat, opencv::imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    let width = size.width as u32;
    let height = size.height as u32;

    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let buffer = rgb_mat.data_bytes()?.to_vec();
    let img_buffer = ImageBuffer::<Rgb<u8>, _>::from_vec(width, height, buffer)
        .ok_or_else(|| anyhow!("Failed to create ImageBuffer from Mat data"))?;

    Ok(Image::from(DynamicImage::ImageRgb8(img_buffer)))
}
