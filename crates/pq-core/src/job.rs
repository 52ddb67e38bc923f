use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::JobError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Submitted,
    Done,
    Error,
}

impl JobStatus {
    /// Queued locally or awaiting a backend result
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Submitted)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Legal moves along pending -> submitted -> done | error.
    /// Terminal states have no outgoing edges.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Submitted)
                | (Self::Pending, Self::Error)
                | (Self::Submitted, Self::Done)
                | (Self::Submitted, Self::Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn icon(&self) -> &str {
        match self {
            Self::Pending => "⏳",
            Self::Submitted => "📤",
            Self::Done => "✅",
            Self::Error => "❌",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to `enqueue`: everything the caller knows about the job up front.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub conversation_id: String,
    pub workflow_id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_s3_link: Option<String>,
}

impl NewJob {
    pub fn new(
        conversation_id: impl Into<String>,
        workflow_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            workflow_id: workflow_id.into(),
            prompt: prompt.into(),
            center_name: None,
            workflow_name: None,
            screenshot_s3_link: None,
        }
    }

    pub fn with_screenshot(mut self, link: impl Into<String>) -> Self {
        self.screenshot_s3_link = Some(link.into());
        self
    }
}

/// Result-set fields delivered by the backend once a job finishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub result: Option<serde_json::Value>,
    pub log_messages: Option<Vec<String>>,
    pub screenshot_url: Option<String>,
    pub llm_generation_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Local `job-<millis>-<random>` id until dispatch, backend id afterwards.
    pub id: String,

    /// Creation ordinal. Stays fixed when `id` is replaced and decides
    /// dispatch order regardless of where the record sits in the list.
    #[serde(default)]
    pub seq: u64,

    pub conversation_id: String,
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_s3_link: Option<String>,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_messages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_generation_time: Option<f64>,
}

impl JobRecord {
    pub fn new(id: String, seq: u64, job: NewJob) -> Self {
        Self {
            id,
            seq,
            conversation_id: job.conversation_id,
            workflow_id: job.workflow_id,
            center_name: job.center_name,
            workflow_name: job.workflow_name,
            prompt: job.prompt,
            screenshot_s3_link: job.screenshot_s3_link,
            status: JobStatus::Pending,
            timestamp: Utc::now(),
            result: None,
            log_messages: None,
            screenshot_url: None,
            error: None,
            llm_generation_time: None,
        }
    }

    /// Whether the backend should return a screenshot alongside the result.
    pub fn include_screenshot(&self) -> bool {
        self.screenshot_s3_link.is_some()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::Terminal { id: self.id.clone(), status: self.status });
        }
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        Ok(())
    }

    /// pending -> submitted. The record takes over the backend-issued id.
    pub fn mark_submitted(&mut self, backend_id: String) -> Result<(), JobError> {
        self.transition(JobStatus::Submitted)?;
        self.id = backend_id;
        Ok(())
    }

    /// submitted -> done
    pub fn mark_done(&mut self, outcome: JobOutcome) -> Result<(), JobError> {
        self.transition(JobStatus::Done)?;
        self.result = outcome.result;
        self.log_messages = outcome.log_messages;
        self.screenshot_url = outcome.screenshot_url;
        self.llm_generation_time = outcome.llm_generation_time;
        Ok(())
    }

    /// pending | submitted -> error
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobStatus::Error)?;
        let error = error.into();
        self.error = Some(if error.is_empty() { "Unknown error".to_string() } else { error });
        Ok(())
    }
}

/// Generates a local job id of the form `job-<millis>-<random>`.
pub fn local_job_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("job-{}-{}", Utc::now().timestamp_millis(), &random[..9])
}
