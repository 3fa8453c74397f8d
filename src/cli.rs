use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Base URL of the entity API
    #[arg(long, env = "API_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub api_url: String,

    /// API key for the internal endpoints
    #[arg(long, env = "API_KEY")]
    pub api_key: String,

    /// Detection model weights
    #[arg(long, env = "MODEL_PATH", default_value = "assets/models/rtdetr-l.onnx")]
    pub model_path: String,

    /// Scratch directory for transcode artifacts
    #[arg(long, env = "WORK_DIR", default_value = "assets")]
    pub work_dir: PathBuf,

    /// Frame-rate ceiling for normalized videos
    #[arg(long, env = "MAX_FPS", default_value_t = 15.0)]
    pub max_fps: f64,

    /// Ceiling for the shorter side of normalized videos, in pixels
    #[arg(long, env = "MAX_BASE_DIMENSION", default_value_t = 360)]
    pub max_base_dimension: i32,

    /// Class ids eligible for counting (COCO ids)
    #[arg(
        long,
        env = "ALLOWED_CLASS_IDS",
        value_delimiter = ',',
        default_values_t = vec![2u16, 3, 5, 7]
    )]
    pub allowed_class_ids: Vec<u16>,

    /// Minimum confidence for a detection to be counted
    #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value_t = 0.5)]
    pub confidence_threshold: f32,

    /// Seconds an idle worker sleeps before polling its queue again
    #[arg(long, env = "ORCHESTRATOR_SLEEP_SECS", default_value_t = 5)]
    pub poll_interval_secs: u64,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
