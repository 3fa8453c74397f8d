// Entity persistence contract and the HTTP client that fulfils it.
//
// The worker never talks to the database directly; video and measurement
// records live behind the entity API and are read/patched over HTTP with
// the internal API key.

use crate::entities::{Detection, Measurement, MeasurementUpdate, Video, VideoUpdate};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub trait VideoStore: Send + Sync {
    fn get_video(&self, video_id: i64) -> Result<Video>;
    fn update_video(&self, video_id: i64, params: &VideoUpdate) -> Result<Video>;
    fn get_measurement(&self, measurement_id: i64) -> Result<Measurement>;
    fn update_measurement(
        &self,
        measurement_id: i64,
        params: &MeasurementUpdate,
    ) -> Result<Measurement>;
    fn create_detection(&self, measurement_id: i64, detection: &Detection) -> Result<()>;
}

pub struct ApiClient {
    base_url: String,
    api_key: String,
    http: reqwest::blocking::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .send()
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?;
        response
            .json()
            .with_context(|| format!("GET {} returned malformed JSON", url))
    }

    fn patch<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .patch(&url)
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .with_context(|| format!("PATCH {} failed", url))?
            .error_for_status()
            .with_context(|| format!("PATCH {} returned an error status", url))?;
        response
            .json()
            .with_context(|| format!("PATCH {} returned malformed JSON", url))
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .with_context(|| format!("POST {} failed", url))?
            .error_for_status()
            .with_context(|| format!("POST {} returned an error status", url))?;
        response
            .json()
            .with_context(|| format!("POST {} returned malformed JSON", url))
    }
}

impl VideoStore for ApiClient {
    fn get_video(&self, video_id: i64) -> Result<Video> {
        self.get(&format!("/api/v1/internal/videos/{}/", video_id))
    }

    fn update_video(&self, video_id: i64, params: &VideoUpdate) -> Result<Video> {
        self.patch(&format!("/api/v1/internal/videos/{}/", video_id), params)
    }

    fn get_measurement(&self, measurement_id: i64) -> Result<Measurement> {
        self.get(&format!("/api/v1/internal/measurements/{}/", measurement_id))
    }

    fn update_measurement(
        &self,
        measurement_id: i64,
        params: &MeasurementUpdate,
    ) -> Result<Measurement> {
        self.patch(
            &format!("/api/v1/internal/measurements/{}/", measurement_id),
            params,
        )
    }

    fn create_detection(&self, measurement_id: i64, detection: &Detection) -> Result<()> {
        let _: serde_json::Value = self.post(
            &format!("/api/v1/internal/measurements/{}/detections/", measurement_id),
            detection,
        )?;
        Ok(())
    }
}
