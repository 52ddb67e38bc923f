use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use pq_core::JobRecord;
use crate::error::Result;
use crate::queue::store::JobStore;

/// In-memory copy of the persisted job list, newest first.
///
/// Every mutation goes through [`JobList::update`] / [`JobList::update_if`],
/// which hold the lock across modify and save. A failed save rolls the
/// in-memory list back, so memory never runs ahead of the store.
///
/// Saves run synchronously on the calling task while the lock is held: a
/// mutation is durable before any other task can observe it.
pub struct JobList {
    jobs: Mutex<Vec<JobRecord>>,
    store: Arc<dyn JobStore>,
    /// Highest creation ordinal handed out; never lowered by removals
    last_seq: AtomicU64,
}

impl JobList {
    pub fn load(store: Arc<dyn JobStore>) -> Self {
        let mut jobs = store.load();
        normalize_seq(&mut jobs);
        let last_seq = jobs.iter().map(|j| j.seq).max().unwrap_or(0);
        info!(count = jobs.len(), last_seq, "job list loaded");

        Self {
            jobs: Mutex::new(jobs),
            store,
            last_seq: AtomicU64::new(last_seq),
        }
    }

    /// Claim a creation ordinal no other record in this process has held
    pub fn next_seq(&self) -> u64 {
        self.last_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub async fn snapshot(&self) -> Vec<JobRecord> {
        self.jobs.lock().await.clone()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&[JobRecord]) -> R) -> R {
        let jobs = self.jobs.lock().await;
        f(&jobs)
    }

    /// Apply `f` and save unconditionally.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Vec<JobRecord>) -> R) -> Result<R> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.clone();
        let out = f(&mut jobs);

        if let Err(e) = self.store.save(&jobs) {
            error!(error = %e, "failed to save job store, rolling back");
            *jobs = before;
            return Err(e);
        }
        Ok(out)
    }

    /// Apply `f`; save only when it reports a change by returning `Some`.
    pub async fn update_if<R>(
        &self,
        f: impl FnOnce(&mut Vec<JobRecord>) -> Option<R>,
    ) -> Result<Option<R>> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.clone();

        let Some(out) = f(&mut jobs) else {
            *jobs = before;
            return Ok(None);
        };

        if let Err(e) = self.store.save(&jobs) {
            error!(error = %e, "failed to save job store, rolling back");
            *jobs = before;
            return Err(e);
        }
        Ok(Some(out))
    }

    /// Drop every record and erase the persisted slot
    pub async fn clear(&self) -> Result<usize> {
        let mut jobs = self.jobs.lock().await;
        self.store.clear()?;
        let removed = jobs.len();
        jobs.clear();
        Ok(removed)
    }
}

/// Records written without an ordinal (or with clashing ones) get fresh
/// ordinals in creation order, oldest (the tail) first.
fn normalize_seq(jobs: &mut [JobRecord]) {
    let mut seen = HashSet::new();
    let unique = jobs.iter().all(|j| j.seq != 0 && seen.insert(j.seq));
    if unique {
        return;
    }

    for (n, job) in jobs.iter_mut().rev().enumerate() {
        job.seq = n as u64 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_core::NewJob;
    use crate::queue::store::MemoryJobStore;

    fn record(id: &str, seq: u64) -> JobRecord {
        JobRecord::new(id.into(), seq, NewJob::new("c", "w", "p"))
    }

    #[tokio::test]
    async fn test_update_if_skips_save_without_change() {
        let store = Arc::new(MemoryJobStore::new());
        let list = JobList::load(store.clone());

        let out = list.update_if(|_| None::<()>).await.unwrap();

        assert!(out.is_none());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_update_saves() {
        let store = Arc::new(MemoryJobStore::new());
        let list = JobList::load(store.clone());

        list.update(|jobs| jobs.insert(0, record("job-1", 1))).await.unwrap();

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().len(), 1);
        assert_eq!(list.snapshot().await[0].id, "job-1");
    }

    #[tokio::test]
    async fn test_legacy_records_get_ordinals_oldest_first() {
        let store = Arc::new(MemoryJobStore::new());
        store.save(&[record("newest", 0), record("middle", 0), record("oldest", 0)]).unwrap();

        let list = JobList::load(store);
        let seqs: Vec<(String, u64)> =
            list.snapshot().await.into_iter().map(|j| (j.id, j.seq)).collect();

        assert_eq!(
            seqs,
            vec![("newest".into(), 3), ("middle".into(), 2), ("oldest".into(), 1)]
        );
    }

    #[tokio::test]
    async fn test_clear_erases_slot() {
        let store = Arc::new(MemoryJobStore::new());
        let list = JobList::load(store.clone());
        list.update(|jobs| jobs.push(record("job-1", 1))).await.unwrap();

        assert_eq!(list.clear().await.unwrap(), 1);
        assert!(store.blob().is_none());
        assert!(list.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_ordinals_never_reused() {
        let store = Arc::new(MemoryJobStore::new());
        store.save(&[record("b", 3), record("a", 7)]).unwrap();
        let list = JobList::load(store);
        assert_eq!(list.next_seq(), 8);

        list.update(|jobs| jobs.retain(|j| j.seq != 7)).await.unwrap();
        assert_eq!(list.next_seq(), 9);

        list.clear().await.unwrap();
        assert_eq!(list.next_seq(), 10);
    }
}
