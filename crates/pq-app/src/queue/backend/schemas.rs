use serde::{Deserialize, Serialize};
use pq_core::{JobOutcome, JobRecord};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub conversation_id: String,
    pub workflow_id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_s3_link: Option<String>,
    pub include_screenshot: bool,
}

impl From<&JobRecord> for SubmitJobRequest {
    fn from(job: &JobRecord) -> Self {
        Self {
            conversation_id: job.conversation_id.clone(),
            workflow_id: job.workflow_id.clone(),
            prompt: job.prompt.clone(),
            screenshot_s3_link: job.screenshot_s3_link.clone(),
            include_screenshot: job.include_screenshot(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    Submitted,
    Done,
    Error,
    /// Anything else the backend reports. Treated as still running.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobResultResponse {
    pub status: RemoteStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
    #[serde(default)]
    pub screenshot_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub llm_generation_time: Option<f64>,
}

impl JobResultResponse {
    pub fn outcome(&self) -> JobOutcome {
        JobOutcome {
            result: self.result.clone(),
            log_messages: self.log_messages.clone(),
            screenshot_url: self.screenshot_url.clone(),
            llm_generation_time: self.llm_generation_time,
        }
    }
}
