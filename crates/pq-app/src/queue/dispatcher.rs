use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use pq_core::{JobRecord, JobStatus};
use crate::events::QueueEvent;
use crate::queue::backend::schemas::SubmitJobRequest;
use crate::queue::backend::JobBackend;
use crate::queue::jobs::JobList;
use crate::queue::poller::Poller;

/// Holds the single dispatch slot; released on every exit path, unwinding included.
struct DispatchGuard<'a>(&'a AtomicBool);

impl<'a> DispatchGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct NextJob {
    seq: u64,
    local_id: String,
    request: SubmitJobRequest,
}

/// Submits pending jobs to the backend one at a time, oldest first.
#[derive(Clone)]
pub struct Dispatcher {
    jobs: Arc<JobList>,
    backend: Arc<dyn JobBackend>,
    poller: Poller,
    events: broadcast::Sender<QueueEvent>,
    in_flight: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        jobs: Arc<JobList>,
        backend: Arc<dyn JobBackend>,
        poller: Poller,
        events: broadcast::Sender<QueueEvent>,
    ) -> Self {
        Self {
            jobs,
            backend,
            poller,
            events,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_dispatching(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start a drain in the background. Coalesces into a no-op while one runs.
    pub fn trigger(&self) {
        if self.is_dispatching() {
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.drain().await;
        });
    }

    /// Submit every pending job in creation order. Returns how many were
    /// attempted, or 0 if another drain already holds the slot.
    pub async fn drain(&self) -> usize {
        // Jobs attempted during this drain; a job whose transition could not
        // be saved stays pending and is left for the next trigger.
        let mut attempted = HashSet::new();

        loop {
            let Some(guard) = DispatchGuard::acquire(&self.in_flight) else {
                debug!("dispatch already in flight");
                return attempted.len();
            };

            while let Some(next) = self.next_pending(&attempted).await {
                attempted.insert(next.seq);
                self.dispatch(next).await;
            }
            drop(guard);

            // A trigger that arrived while the slot was held was coalesced away
            if self.next_pending(&attempted).await.is_none() {
                return attempted.len();
            }
        }
    }

    async fn next_pending(&self, attempted: &HashSet<u64>) -> Option<NextJob> {
        self.jobs
            .read(|jobs| {
                jobs.iter()
                    .enumerate()
                    .filter(|(_, j)| j.status == JobStatus::Pending && !attempted.contains(&j.seq))
                    .min_by_key(|(i, j)| (j.seq, Reverse(*i)))
                    .map(|(_, j)| NextJob {
                        seq: j.seq,
                        local_id: j.id.clone(),
                        request: SubmitJobRequest::from(j),
                    })
            })
            .await
    }

    async fn dispatch(&self, next: NextJob) {
        let NextJob { seq, local_id, request } = next;
        info!(job_id = %local_id, conversation_id = %request.conversation_id, "dispatching job");

        match self.backend.submit_job(&request).await {
            Ok(resp) => self.on_submitted(seq, &local_id, resp.job_id).await,
            Err(e) => {
                warn!(job_id = %local_id, error = %e, "job submission failed");
                self.on_failed(seq, &local_id, e.to_string()).await;
            }
        }
    }

    async fn on_submitted(&self, seq: u64, local_id: &str, job_id: String) {
        let applied = self
            .jobs
            .update_if(|jobs| {
                let duplicate = jobs.iter().any(|j| j.seq != seq && j.id == job_id);
                let job = find_pending(jobs, seq, local_id)?;
                let moved = if duplicate {
                    job.mark_failed(format!("Backend returned duplicate job id {job_id}"))
                } else {
                    job.mark_submitted(job_id.clone())
                };
                moved.ok().map(|_| (job.status, job.error.clone()))
            })
            .await;

        match applied {
            Ok(Some((JobStatus::Submitted, _))) => {
                info!(local_id, %job_id, "job submitted");
                let _ = self.events.send(QueueEvent::JobSubmitted {
                    local_id: local_id.to_string(),
                    job_id: job_id.clone(),
                });
                self.poller.watch(job_id).await;
            }
            Ok(Some((_, error))) => {
                warn!(local_id, %job_id, "backend id already in use");
                let _ = self.events.send(QueueEvent::JobFailed {
                    job_id: local_id.to_string(),
                    from: JobStatus::Pending,
                    error: error.unwrap_or_default(),
                });
            }
            Ok(None) => {
                warn!(local_id, %job_id, "job removed during submission, discarding backend id");
            }
            Err(e) => {
                error!(local_id, error = %e, "could not record submission");
            }
        }
    }

    async fn on_failed(&self, seq: u64, local_id: &str, message: String) {
        let applied = self
            .jobs
            .update_if(|jobs| {
                let job = find_pending(jobs, seq, local_id)?;
                job.mark_failed(message.clone()).ok()?;
                job.error.clone()
            })
            .await;

        match applied {
            Ok(Some(error)) => {
                let _ = self.events.send(QueueEvent::JobFailed {
                    job_id: local_id.to_string(),
                    from: JobStatus::Pending,
                    error,
                });
            }
            Ok(None) => debug!(local_id, "failed job no longer queued"),
            Err(e) => error!(local_id, error = %e, "could not record submission failure"),
        }
    }
}

/// The record a submission was made for, if it is still queued under the
/// same ordinal and local id.
fn find_pending<'a>(jobs: &'a mut [JobRecord], seq: u64, local_id: &str) -> Option<&'a mut JobRecord> {
    jobs.iter_mut()
        .find(|j| j.seq == seq && j.id == local_id && j.status == JobStatus::Pending)
}
