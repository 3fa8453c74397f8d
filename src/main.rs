mod cli;
mod entities;
mod model;
mod pipeline;
mod queue;
mod service;
mod storage;
#[cfg(test)]
mod test_support;
mod video;

use anyhow::{Context, Result};
use cli::Args;
use crossbeam::channel::Receiver;
use model::detector::ObjectDetector;
use model::TrackingPipeline;
use pipeline::optimizer::Optimizer;
use pipeline::orchestrator::{
    run_worker, Stage, StageKind, MEASUREMENT_QUEUES, VIDEO_QUEUES,
};
use pipeline::predictor::Predictor;
use queue::RedisQueue;
use service::ApiClient;
use storage::ApiStorage;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();
    std::fs::create_dir_all(&args.work_dir)
        .with_context(|| format!("Failed to create work dir {:?}", args.work_dir))?;

    // Senders stay in main; the workers run until the process ends.
    let (_shutdown_tx, shutdown_rx) = crossbeam::channel::bounded::<()>(0);

    let optimizer_handle = spawn_worker("optimizer", args.clone(), shutdown_rx.clone(), run_optimizer)?;
    let predictor_handle = spawn_worker("predictor", args, shutdown_rx, run_predictor)?;

    for handle in [optimizer_handle, predictor_handle] {
        if handle.join().is_err() {
            tracing::error!("A worker thread panicked");
        }
    }

    Ok(())
}

fn spawn_worker(
    name: &'static str,
    args: Args,
    shutdown: Receiver<()>,
    run: fn(&Args, &Receiver<()>) -> Result<()>,
) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            tracing::info!("Spawning {} worker", name);
            if let Err(error) = run(&args, &shutdown) {
                tracing::error!("{} worker failed: {:#}", name, error);
            }
        })
        .with_context(|| format!("Failed to spawn {} worker", name))?;
    Ok(handle)
}

fn run_optimizer(args: &Args, shutdown: &Receiver<()>) -> Result<()> {
    let queue = RedisQueue::connect(&args.redis_url)?;
    let store = ApiClient::new(&args.api_url, &args.api_key);
    let storage = ApiStorage::new(&args.api_url, &args.api_key);

    let optimizer = Optimizer::new(
        &store,
        &storage,
        args.max_fps,
        args.max_base_dimension,
        &args.work_dir,
    );
    let stage = Stage::new("optimizer", VIDEO_QUEUES, StageKind::Video, &queue, &store);

    run_worker(
        &stage,
        Duration::from_secs(args.poll_interval_secs),
        shutdown,
        |video_id| optimizer.process(video_id),
        |video_id| optimizer.enqueue_measurements(&queue, video_id),
    );
    Ok(())
}

fn run_predictor(args: &Args, shutdown: &Receiver<()>) -> Result<()> {
    let queue = RedisQueue::connect(&args.redis_url)?;
    let store = ApiClient::new(&args.api_url, &args.api_key);
    let storage = ApiStorage::new(&args.api_url, &args.api_key);

    let detector = ObjectDetector::new(&args.model_path)?;
    let mut predictor = Predictor::new(
        &store,
        &storage,
        Box::new(TrackingPipeline::new(detector)),
        &args.allowed_class_ids,
        args.confidence_threshold,
        &args.work_dir,
    );
    let stage = Stage::new(
        "predictor",
        MEASUREMENT_QUEUES,
        StageKind::Measurement,
        &queue,
        &store,
    );

    run_worker(
        &stage,
        Duration::from_secs(args.poll_interval_secs),
        shutdown,
        |measurement_id| predictor.process(measurement_id),
        |_| Ok(()),
    );
    Ok(())
}
