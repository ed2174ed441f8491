//! REST API client for the compute service.
//!
//! Wraps the synchronous calculate call, asynchronous job start, the
//! per-job event stream and cancellation using [`reqwest`].

use std::time::Duration;

use bytes::Bytes;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Path suffixes trimmed from a configured URL to derive the service base.
const BASE_SUFFIXES: [&str; 2] = ["/calculate/python", "/calculate"];

/// HTTP client for the compute service.
#[derive(Clone)]
pub struct SolverApi {
    client: reqwest::Client,
    base_url: String,
}

/// Status and raw body of a synchronous calculate call.
#[derive(Debug, Clone)]
pub struct SolverReply {
    pub status: u16,
    pub body: Bytes,
}

impl SolverReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Response of the job-start endpoint.
#[derive(Debug, Deserialize)]
struct StartResponse {
    #[serde(default)]
    job_id: Option<String>,
}

/// Errors from the compute-service client.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Compute service error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The job-start response carried no usable job id.
    #[error("Compute service returned no job id")]
    MissingJobId,

    /// A job id or base URL could not be turned into an endpoint URL.
    #[error("Invalid compute service URL: {0}")]
    InvalidUrl(String),

    /// Reading the event stream failed part way.
    #[error("Event stream read failed: {0}")]
    Stream(String),

    /// No bytes arrived on the event stream within the idle deadline.
    #[error("Event stream idle for {0:?}")]
    IdleTimeout(Duration),
}

impl SolverApi {
    /// Create a client for the service at `url`.
    ///
    /// A trailing `/calculate/python` or `/calculate` is trimmed so either
    /// the service root or its legacy calculate URL may be configured.
    pub fn new(url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            base_url: base_url_from(url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a calculation synchronously.
    ///
    /// Sends `POST /calculate/python` and returns the status and body as
    /// received, whatever the status.
    pub async fn calculate<T: Serialize + ?Sized>(
        &self,
        input: &T,
    ) -> Result<SolverReply, SolverError> {
        let url = self.endpoint(&["calculate", "python"])?;
        let response = self.client.post(url).json(input).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(SolverReply { status, body })
    }

    /// Start an asynchronous job.
    ///
    /// Sends `POST /calculate/stream/start` and returns the job id the
    /// service assigned. A missing or empty job id is an error.
    pub async fn start_job<T: Serialize + ?Sized>(&self, input: &T) -> Result<String, SolverError> {
        let url = self.endpoint(&["calculate", "stream", "start"])?;
        let response = self.client.post(url).json(input).send().await?;
        let started: StartResponse = Self::parse_response(response).await?;

        match started.job_id {
            Some(job_id) if !job_id.trim().is_empty() => Ok(job_id),
            _ => Err(SolverError::MissingJobId),
        }
    }

    /// Open the event stream of a job.
    ///
    /// Sends `GET /calculate/stream/{job_id}`. The returned response's
    /// body has not been read yet.
    pub async fn open_stream(&self, job_id: &str) -> Result<reqwest::Response, SolverError> {
        let url = self.endpoint(&["calculate", "stream", job_id])?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    /// Ask the service to cancel a job.
    ///
    /// Sends `POST /calculate/stream/{job_id}/cancel`. Any non-success
    /// status is returned as [`SolverError::ApiError`].
    pub async fn cancel(&self, job_id: &str) -> Result<(), SolverError> {
        let url = self.endpoint(&["calculate", "stream", job_id, "cancel"])?;
        let response = self.client.post(url).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- private helpers ----

    /// Build an endpoint URL, percent-encoding each path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SolverError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| SolverError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SolverError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ensure the response has a success status code.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, SolverError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SolverError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SolverError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Derive the service base URL from a configured URL.
pub fn base_url_from(url: &str) -> String {
    let mut base = url.trim().trim_end_matches('/');
    for suffix in BASE_SUFFIXES {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped;
            break;
        }
    }
    base.to_string()
}
