//! HTTP client for the bulk-analysis service.
//!
//! ARCHITECTURAL RULE: no other module talks to the analysis service
//! directly; the poller and submission step go through [`AnalysisBackend`].
//! The HTTP layer classifies failures into explicit kinds; the poller never
//! inspects status codes or message text itself.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::models::job::{BulkSubmitResponse, JobStatus};

/// Per-request timeout. Deliberately short so one hung call cannot stall a
/// poll loop whose overall budget is hours.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limited by the analysis service")]
    RateLimited { retry_after: Option<u64> },

    #[error("job not found or expired")]
    NotFound,

    #[error("analysis service error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl ApiError {
    /// Worth retrying at the normal cadence. Rate limiting retries too, but
    /// on its own backoff schedule; not-found is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Server { .. } | ApiError::Network(_))
    }
}

/// One file in a bulk submission.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn submit_batch(
        &self,
        files: &[BatchFile],
        priorities: &[String],
        job_name: Option<&str>,
    ) -> Result<BulkSubmitResponse, ApiError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ApiError>;
}

/// The real backend over HTTP.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn submit_batch(
        &self,
        files: &[BatchFile],
        priorities: &[String],
        job_name: Option<&str>,
    ) -> Result<BulkSubmitResponse, ApiError> {
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.name.clone())
                .mime_str("application/pdf")?;
            form = form.part("files", part);
        }
        if !priorities.is_empty() {
            form = form.text("priorities", priorities.join(","));
        }
        if let Some(job_name) = job_name {
            form = form.text("job_name", job_name.to_string());
        }

        debug!(files = files.len(), "submitting bulk analysis batch");
        let response = self
            .client
            .post(format!("{}/bulk_analyze_resumes", self.base_url))
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ApiError> {
        let response = self
            .client
            .get(format!("{}/bulk_job_status/{}", self.base_url, job_id))
            .send()
            .await?;
        decode(response).await
    }
}

/// Maps a raw response onto the error taxonomy, decoding the body on success.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());
        return Err(ApiError::RateLimited { retry_after });
    }

    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return Err(ApiError::NotFound);
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ApiError::Server {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}
