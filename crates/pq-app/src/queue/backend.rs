pub mod schemas;

use std::time::Duration;
use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;
use crate::error::{AppError, Result};
use crate::queue::backend::schemas::{JobResultResponse, SubmitJobRequest, SubmitJobResponse};

/// The two operations the queue needs from the LLM-serving backend.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<SubmitJobResponse>;

    async fn job_result(&self, job_id: &str) -> Result<JobResultResponse>;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl AsRef<str>) -> Result<Self> {
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw)
            .map_err(|e| AppError::Config(format!("invalid backend url {raw}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!("backend url {raw} cannot carry a path")));
        }
        Ok(Self { client, base_url })
    }

    /// Base url with `segments` appended, each one percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("backend url {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::HttpStatus { status: status.as_u16(), body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<SubmitJobResponse> {
        let url = self.endpoint(&["jobs"])?;
        debug!(%url, conversation_id = %request.conversation_id, "submitting job");

        let response = self.client.post(url).json(request).send().await?;
        let submitted: SubmitJobResponse = Self::read_json(response).await?;

        if submitted.job_id.trim().is_empty() {
            return Err(AppError::BackendError("empty jobId in submit response".into()));
        }
        Ok(submitted)
    }

    async fn job_result(&self, job_id: &str) -> Result<JobResultResponse> {
        let url = self.endpoint(&["jobs", job_id])?;
        let response = self.client.get(url).send().await?;
        Self::read_json(response).await
    }
}
