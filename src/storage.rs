// Object storage contract: presigned URLs plus artifact upload.
//
// The worker owns key generation; URL signing lives behind the entity
// API and this process holds no cloud credentials.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Build the storage key for an artifact of the given pipeline stage,
/// e.g. `videos/optimized/8f14e45f-....mp4`.
pub fn generate_video_key(stage: &str) -> String {
    format!("videos/{}/{}.mp4", stage, Uuid::new_v4())
}

/// Local scratch paths for one artifact key: the raw transcode output
/// (underscore-prefixed) and the container-normalized file that gets
/// uploaded.
pub fn artifact_paths(work_dir: &Path, key: &str) -> (PathBuf, PathBuf) {
    let filename = key.rsplit('/').next().unwrap_or(key);
    (
        work_dir.join(format!("_{}", filename)),
        work_dir.join(filename),
    )
}

/// Best-effort cleanup of local artifacts after an item finishes either
/// way; failures are logged, never escalated.
pub fn remove_artifacts(paths: &[&Path]) {
    for path in paths {
        if path.exists() {
            if let Err(error) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove artifact {:?}: {}", path, error);
            }
        }
    }
}

pub trait ObjectStorage: Send + Sync {
    /// URL a client may PUT the object bytes to.
    fn put_presigned_url(&self, key: &str) -> Result<String>;

    /// URL the object bytes may be fetched from.
    fn get_presigned_url(&self, key: &str) -> Result<String>;

    /// Upload a local file under `key`.
    fn upload_file(&self, local_path: &Path, key: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct PresignResponse {
    url: String,
}

pub struct ApiStorage {
    base_url: String,
    api_key: String,
    http: reqwest::blocking::Client,
}

impl ApiStorage {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn presign(&self, key: &str, op: &str) -> Result<String> {
        let url = format!("{}/api/v1/internal/storage/presign/", self.base_url);
        let response: PresignResponse = self
            .http
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(&[("key", key), ("op", op)])
            .send()
            .with_context(|| format!("Presign request for {} failed", key))?
            .error_for_status()
            .with_context(|| format!("Presign request for {} was rejected", key))?
            .json()
            .context("Presign response was malformed")?;
        Ok(response.url)
    }
}

impl ObjectStorage for ApiStorage {
    fn put_presigned_url(&self, key: &str) -> Result<String> {
        self.presign(key, "put")
    }

    fn get_presigned_url(&self, key: &str) -> Result<String> {
        self.presign(key, "get")
    }

    fn upload_file(&self, local_path: &Path, key: &str) -> Result<()> {
        let url = self.put_presigned_url(key)?;
        let bytes = std::fs::read(local_path)
            .with_context(|| format!("Failed to read artifact {:?}", local_path))?;

        tracing::info!("Uploading {:?} ({} bytes) as {}", local_path, bytes.len(), key);
        self.http
            .put(&url)
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .send()
            .with_context(|| format!("Upload of {} failed", key))?
            .error_for_status()
            .with_context(|| format!("Upload of {} was rejected", key))?;
        Ok(())
    }
}
