use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::info;
use pq_core::{local_job_id, ConversationCatalog, JobRecord, JobStatus, NewJob};
use crate::config::QueueConfig;
use crate::error::Result;
use crate::events::QueueEvent;
use crate::queue::backend::{HttpBackend, JobBackend};
use crate::queue::dispatcher::Dispatcher;
use crate::queue::jobs::JobList;
use crate::queue::poller::Poller;
use crate::queue::store::{FileJobStore, JobStore};

pub mod backend;
pub mod dispatcher;
pub mod jobs;
pub mod poller;
pub mod reconciler;
pub mod store;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub submitted: usize,
    pub done: usize,
    pub error: usize,
}

impl QueueStats {
    pub fn active(&self) -> usize {
        self.pending + self.submitted
    }

    pub fn finished(&self) -> usize {
        self.done + self.error
    }
}

/// Entry point for the rest of the dashboard: add, remove and list jobs.
pub struct JobQueue {
    jobs: Arc<JobList>,
    dispatcher: Dispatcher,
    poller: Poller,
    events: broadcast::Sender<QueueEvent>,
    catalog: Mutex<Option<ConversationCatalog>>,
}

impl JobQueue {
    /// Load persisted jobs and resume work: poll everything `submitted`,
    /// dispatch everything `pending`.
    pub async fn open(
        store: Arc<dyn JobStore>,
        backend: Arc<dyn JobBackend>,
        poll_interval: Duration,
    ) -> Self {
        let jobs = Arc::new(JobList::load(store));
        let (events, _) = broadcast::channel(256);
        let poller = Poller::new(jobs.clone(), backend.clone(), poll_interval, events.clone());
        let dispatcher = Dispatcher::new(jobs.clone(), backend, poller.clone(), events.clone());

        let queue = Self {
            jobs,
            dispatcher,
            poller,
            events,
            catalog: Mutex::new(None),
        };
        queue.resume().await;
        queue
    }

    pub async fn from_config(config: &QueueConfig) -> Result<Self> {
        let store = Arc::new(FileJobStore::new(config.store_path()));
        let backend = Arc::new(HttpBackend::new(&config.backend_url, config.request_timeout)?);
        Ok(Self::open(store, backend, config.poll_interval).await)
    }

    async fn resume(&self) {
        let (submitted, pending): (Vec<String>, usize) = self
            .jobs
            .read(|jobs| {
                (
                    jobs.iter()
                        .filter(|j| j.status == JobStatus::Submitted)
                        .map(|j| j.id.clone())
                        .collect(),
                    jobs.iter().filter(|j| j.status == JobStatus::Pending).count(),
                )
            })
            .await;

        info!(submitted = submitted.len(), pending, "resuming job queue");
        for job_id in submitted {
            self.poller.watch(job_id).await;
        }
        if pending > 0 {
            self.dispatcher.trigger();
        }
    }

    /// Queue a job and return right away; submission happens in the background.
    pub async fn enqueue(&self, job: NewJob) -> Result<JobRecord> {
        let catalog = self.catalog.lock().await;
        let record = self
            .jobs
            .update(|jobs| {
                let mut id = local_job_id();
                while jobs.iter().any(|j| j.id == id) {
                    id = local_job_id();
                }
                let mut record = JobRecord::new(id, self.jobs.next_seq(), job);
                if let Some(catalog) = catalog.as_ref() {
                    reconciler::backfill_one(&mut record, catalog);
                }
                jobs.insert(0, record.clone());
                record
            })
            .await?;
        drop(catalog);

        info!(job_id = %record.id, conversation_id = %record.conversation_id, "job queued");
        let _ = self.events.send(QueueEvent::JobQueued { id: record.id.clone() });
        self.dispatcher.trigger();
        Ok(record)
    }

    /// Delete one job. Unknown ids are a no-op.
    pub async fn remove(&self, job_id: &str) -> Result<bool> {
        let removed = self
            .jobs
            .update_if(|jobs| {
                let idx = jobs.iter().position(|j| j.id == job_id)?;
                Some(jobs.remove(idx))
            })
            .await?;
        self.poller.unwatch(job_id).await;

        let Some(job) = removed else {
            return Ok(false);
        };
        info!(job_id, status = %job.status, "job removed");
        let _ = self.events.send(QueueEvent::JobRemoved(job_id.to_string()));
        Ok(true)
    }

    /// Delete every job and erase the persisted slot.
    pub async fn clear(&self) -> Result<usize> {
        let removed = self.jobs.clear().await?;
        self.poller.clear().await;

        info!(removed, "job queue cleared");
        let _ = self.events.send(QueueEvent::QueueCleared);
        Ok(removed)
    }

    /// Delete every job in a terminal state.
    pub async fn clear_finished(&self) -> Result<usize> {
        let removed = self
            .jobs
            .update_if(|jobs| {
                let before = jobs.len();
                jobs.retain(|j| !j.status.is_terminal());
                let removed = before - jobs.len();
                (removed > 0).then_some(removed)
            })
            .await?
            .unwrap_or(0);

        if removed > 0 {
            info!(removed, "finished jobs cleared");
        }
        Ok(removed)
    }

    /// Remember the conversation catalog and backfill names from it.
    pub async fn set_catalog(&self, catalog: ConversationCatalog) -> Result<usize> {
        let mut current = self.catalog.lock().await;
        *current = Some(catalog);
        self.reconcile_with(current.as_ref()).await
    }

    /// Backfill names from the catalog already known, if any.
    pub async fn reconcile(&self) -> Result<usize> {
        let current = self.catalog.lock().await;
        self.reconcile_with(current.as_ref()).await
    }

    async fn reconcile_with(&self, catalog: Option<&ConversationCatalog>) -> Result<usize> {
        let Some(catalog) = catalog else {
            return Ok(0);
        };

        let updated = self
            .jobs
            .update_if(|jobs| {
                let updated = reconciler::backfill(jobs, catalog);
                (updated > 0).then_some(updated)
            })
            .await?
            .unwrap_or(0);

        if updated > 0 {
            info!(updated, "backfilled job metadata");
            let _ = self.events.send(QueueEvent::MetadataReconciled { updated });
        }
        Ok(updated)
    }

    /// All jobs, newest first
    pub async fn jobs(&self) -> Vec<JobRecord> {
        self.jobs.snapshot().await
    }

    pub async fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.read(|jobs| jobs.iter().find(|j| j.id == job_id).cloned()).await
    }

    pub async fn stats(&self) -> QueueStats {
        self.jobs
            .read(|jobs| {
                let mut stats = QueueStats::default();
                for job in jobs {
                    match job.status {
                        JobStatus::Pending => stats.pending += 1,
                        JobStatus::Submitted => stats.submitted += 1,
                        JobStatus::Done => stats.done += 1,
                        JobStatus::Error => stats.error += 1,
                    }
                }
                stats
            })
            .await
    }

    /// Ids the poller is currently watching
    pub async fn watched(&self) -> Vec<String> {
        self.poller.watched().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Nothing queued, nothing being submitted, nothing being polled.
    pub async fn is_idle(&self) -> bool {
        !self.dispatcher.is_dispatching()
            && self.stats().await.pending == 0
            && self.poller.watched().await.is_empty()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub async fn shutdown(&self) {
        self.poller.shutdown().await;
    }
}
