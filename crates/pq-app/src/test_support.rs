use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use crate::error::{AppError, Result};
use crate::queue::backend::schemas::{
    JobResultResponse, RemoteStatus, SubmitJobRequest, SubmitJobResponse,
};
use crate::queue::backend::JobBackend;

pub enum SubmitReply {
    Id(String),
    Http(u16, String),
    Panic,
}

/// Scripted in-process backend.
///
/// Submissions consume `submit_script` front to back and fall back to
/// `remote-<n>` ids once it runs dry. Result queries return whatever was
/// last set for the id, or `submitted` if nothing was.
#[derive(Default)]
pub struct FakeBackend {
    submit_script: Mutex<VecDeque<SubmitReply>>,
    results: Mutex<HashMap<String, std::result::Result<JobResultResponse, String>>>,
    submits: Mutex<Vec<SubmitJobRequest>>,
    queries: Mutex<Vec<String>>,
    submit_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    issued: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submit_delay(delay: Duration) -> Self {
        Self {
            submit_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script_submit(&self, reply: SubmitReply) {
        self.submit_script.lock().unwrap().push_back(reply);
    }

    pub fn set_result(&self, job_id: &str, resp: JobResultResponse) {
        self.results.lock().unwrap().insert(job_id.to_string(), Ok(resp));
    }

    pub fn fail_result(&self, job_id: &str, message: &str) {
        self.results.lock().unwrap().insert(job_id.to_string(), Err(message.to_string()));
    }

    pub fn submits(&self) -> Vec<SubmitJobRequest> {
        self.submits.lock().unwrap().clone()
    }

    pub fn queries_for(&self, job_id: &str) -> usize {
        self.queries.lock().unwrap().iter().filter(|q| *q == job_id).count()
    }

    pub fn total_queries(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobBackend for FakeBackend {
    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<SubmitJobResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.submits.lock().unwrap().push(request.clone());

        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.submit_script.lock().unwrap().pop_front();
        match scripted {
            Some(SubmitReply::Id(job_id)) => Ok(SubmitJobResponse { job_id }),
            Some(SubmitReply::Http(status, body)) => Err(AppError::HttpStatus { status, body }),
            Some(SubmitReply::Panic) => panic!("backend blew up"),
            None => {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(SubmitJobResponse { job_id: format!("remote-{n}") })
            }
        }
    }

    async fn job_result(&self, job_id: &str) -> Result<JobResultResponse> {
        self.queries.lock().unwrap().push(job_id.to_string());
        let scripted = self.results.lock().unwrap().get(job_id).cloned();
        match scripted {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(message)) => Err(AppError::BackendError(message)),
            None => Ok(running()),
        }
    }
}

fn response(status: RemoteStatus) -> JobResultResponse {
    JobResultResponse {
        status,
        result: None,
        log_messages: None,
        screenshot_url: None,
        error: None,
        llm_generation_time: None,
    }
}

pub fn running() -> JobResultResponse {
    response(RemoteStatus::Submitted)
}

pub fn done(result: serde_json::Value) -> JobResultResponse {
    JobResultResponse {
        result: Some(result),
        llm_generation_time: Some(1.25),
        ..response(RemoteStatus::Done)
    }
}

pub fn failed(message: &str) -> JobResultResponse {
    JobResultResponse {
        error: Some(message.to_string()),
        ..response(RemoteStatus::Error)
    }
}
