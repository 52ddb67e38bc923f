use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use pq_core::JobStatus;
use crate::events::QueueEvent;
use crate::queue::backend::schemas::{JobResultResponse, RemoteStatus};
use crate::queue::backend::JobBackend;
use crate::queue::jobs::JobList;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub queried: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_running: usize,
    /// Ids given up on because the query itself failed
    pub dropped: usize,
}

#[derive(Default)]
struct WatchState {
    ids: HashSet<String>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

struct PollerInner {
    jobs: Arc<JobList>,
    backend: Arc<dyn JobBackend>,
    events: broadcast::Sender<QueueEvent>,
    interval: Duration,
    watch: Mutex<WatchState>,
}

/// Polls the backend for every watched job on a fixed interval.
/// The timer only runs while the watch-set is non-empty.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<PollerInner>,
}

enum Applied {
    Completed,
    Failed,
}

impl Poller {
    pub fn new(
        jobs: Arc<JobList>,
        backend: Arc<dyn JobBackend>,
        interval: Duration,
        events: broadcast::Sender<QueueEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                jobs,
                backend,
                events,
                interval,
                watch: Mutex::new(WatchState::default()),
            }),
        }
    }

    pub async fn watch(&self, job_id: String) {
        let mut state = self.inner.watch.lock().await;
        if state.ids.insert(job_id.clone()) {
            debug!(%job_id, "watching job");
        }
        if state.timer.is_none() {
            state.generation += 1;
            state.timer = Some(self.arm(state.generation));
            info!(interval_secs = self.inner.interval.as_secs_f64(), "poll timer armed");
        }
    }

    pub async fn unwatch(&self, job_id: &str) -> bool {
        let mut state = self.inner.watch.lock().await;
        let removed = state.ids.remove(job_id);
        if state.ids.is_empty() {
            Self::disarm(&mut state);
        }
        removed
    }

    /// Empty the watch-set and stop the timer
    pub async fn clear(&self) {
        let mut state = self.inner.watch.lock().await;
        state.ids.clear();
        Self::disarm(&mut state);
    }

    pub async fn shutdown(&self) {
        let mut state = self.inner.watch.lock().await;
        Self::disarm(&mut state);
    }

    pub async fn watched(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.watch.lock().await.ids.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_armed(&self) -> bool {
        self.inner.watch.lock().await.timer.is_some()
    }

    fn disarm(state: &mut WatchState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
            debug!("poll timer disarmed");
        }
    }

    fn arm(&self, generation: u64) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move { poller.run(generation).await })
    }

    async fn run(self, generation: u64) {
        let period = self.inner.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let summary = self.poll_once().await;
            debug!(?summary, "poll tick");

            let mut state = self.inner.watch.lock().await;
            if state.generation != generation {
                return;
            }
            if state.ids.is_empty() {
                state.timer = None;
                debug!("watch-set empty, poll timer disarmed");
                return;
            }
        }
    }

    /// One tick: query every watched job that is still `submitted`.
    ///
    /// Ids whose record vanished or already left `submitted` are dropped
    /// without a request. A query that errors drops its id and leaves the
    /// record untouched.
    pub async fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();
        let watched: Vec<String> = self.inner.watch.lock().await.ids.iter().cloned().collect();

        let live: Vec<String> = self
            .inner
            .jobs
            .read(|jobs| {
                watched
                    .iter()
                    .filter(|id| {
                        jobs.iter().any(|j| &j.id == *id && j.status == JobStatus::Submitted)
                    })
                    .cloned()
                    .collect()
            })
            .await;
        for stale in watched.iter().filter(|id| !live.contains(*id)) {
            debug!(job_id = %stale, "no longer submitted, dropping from watch-set");
            self.forget(stale).await;
        }

        summary.queried = live.len();
        let responses =
            join_all(live.iter().map(|id| self.inner.backend.job_result(id))).await;

        for (job_id, response) in live.iter().zip(responses) {
            match response {
                Ok(resp) => match resp.status {
                    RemoteStatus::Done | RemoteStatus::Error => {
                        match self.apply(job_id, &resp).await {
                            Some(Applied::Completed) => summary.completed += 1,
                            Some(Applied::Failed) => summary.failed += 1,
                            None => {}
                        }
                    }
                    RemoteStatus::Pending | RemoteStatus::Submitted | RemoteStatus::Unknown => {
                        summary.still_running += 1;
                    }
                },
                Err(e) => {
                    warn!(%job_id, error = %e, "result query failed, no longer polling job");
                    self.forget(job_id).await;
                    summary.dropped += 1;
                }
            }
        }

        summary
    }

    async fn apply(&self, job_id: &str, resp: &JobResultResponse) -> Option<Applied> {
        let saved = self
            .inner
            .jobs
            .update_if(|jobs| {
                let job = jobs.iter_mut().find(|j| j.id == job_id)?;
                let applied = if resp.status == RemoteStatus::Done {
                    job.mark_done(resp.outcome()).map(|_| Applied::Completed)
                } else {
                    let message = resp
                        .error
                        .clone()
                        .unwrap_or_else(|| "Backend reported an error".to_string());
                    job.mark_failed(message).map(|_| Applied::Failed)
                };
                applied.ok().map(|a| (a, job.error.clone()))
            })
            .await;

        match saved {
            Ok(Some((applied, error))) => {
                let event = match (&applied, error) {
                    (Applied::Failed, Some(error)) => {
                        warn!(%job_id, %error, "job failed");
                        QueueEvent::JobFailed {
                            job_id: job_id.to_string(),
                            from: JobStatus::Submitted,
                            error,
                        }
                    }
                    _ => {
                        info!(%job_id, "job done");
                        QueueEvent::JobCompleted(job_id.to_string())
                    }
                };
                let _ = self.inner.events.send(event);
                self.forget(job_id).await;
                Some(applied)
            }
            Ok(None) => {
                self.forget(job_id).await;
                None
            }
            // Still submitted in memory and on disk; try again next tick
            Err(e) => {
                error!(%job_id, error = %e, "could not record job result");
                None
            }
        }
    }

    /// Drop an id without touching the timer; the tick loop disarms itself.
    async fn forget(&self, job_id: &str) {
        self.inner.watch.lock().await.ids.remove(job_id);
    }
}
