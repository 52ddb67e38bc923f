use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use pq_core::JobRecord;
use crate::error::Result;

/// Durable slot holding the whole ordered job list as one JSON blob.
///
/// `load` never fails: a missing or unreadable slot is an empty queue.
/// `save` overwrites the slot and is durable by the time it returns.
pub trait JobStore: Send + Sync {
    fn load(&self) -> Vec<JobRecord>;

    fn save(&self, jobs: &[JobRecord]) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

fn decode(raw: &str, origin: &str) -> Vec<JobRecord> {
    match serde_json::from_str::<Vec<JobRecord>>(raw) {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(origin, error = %e, "discarding malformed job store");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl JobStore for FileJobStore {
    fn load(&self) -> Vec<JobRecord> {
        let origin = self.path.display().to_string();
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let jobs = decode(&raw, &origin);
                info!(path = %origin, count = jobs.len(), "loaded job store");
                jobs
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %origin, error = %e, "job store unreadable, starting empty");
                Vec::new()
            }
        }
    }

    fn save(&self, jobs: &[JobRecord]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        // Write-then-rename so a crash mid-save leaves the previous blob intact
        let tmp = self.temp_path();
        let blob = serde_json::to_vec(jobs)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&blob)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process slot. Holds the serialized blob exactly as a file would.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    blob: Mutex<Option<String>>,
    saves: Mutex<usize>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot with raw content, well-formed or not
    pub fn with_blob(raw: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(raw.into())),
            saves: Mutex::new(0),
        }
    }

    pub fn blob(&self) -> Option<String> {
        self.blob.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Number of successful `save` calls
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or_default()
    }
}

impl JobStore for MemoryJobStore {
    fn load(&self) -> Vec<JobRecord> {
        match self.blob() {
            Some(raw) => decode(&raw, "memory"),
            None => Vec::new(),
        }
    }

    fn save(&self, jobs: &[JobRecord]) -> Result<()> {
        let raw = serde_json::to_string(jobs)?;
        *self.blob.lock().map_err(|_| poisoned())? = Some(raw);
        *self.saves.lock().map_err(|_| poisoned())? += 1;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.blob.lock().map_err(|_| poisoned())? = None;
        Ok(())
    }
}

fn poisoned() -> io::Error {
    io::Error::other("memory job store lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pq_core::{JobOutcome, NewJob};
    use crate::error::AppError;

    fn sample_jobs() -> Vec<JobRecord> {
        let mut done = JobRecord::new("job-a".into(), 1, NewJob::new("c1", "w1", "first"));
        done.mark_submitted("remote-1".into()).unwrap();
        done.mark_done(JobOutcome {
            result: Some(serde_json::json!({"reply": "hi"})),
            log_messages: Some(vec!["step 1".into()]),
            screenshot_url: Some("https://cdn/shot.png".into()),
            llm_generation_time: Some(0.75),
        })
        .unwrap();

        let mut pending = JobRecord::new(
            "job-b".into(),
            2,
            NewJob::new("c2", "w2", "second").with_screenshot("s3://b/k"),
        );
        pending.center_name = Some("North".into());

        vec![pending, done]
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path().join("nested").join("jobs.json"));
        let jobs = sample_jobs();

        store.save(&jobs).unwrap();
        assert_eq!(store.load(), jobs);

        store.save(&[]).unwrap();
        assert!(store.load().is_empty());
        assert!(store.path().exists());
    }

    #[test]
    fn test_file_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path().join("jobs.json"));

        assert!(store.load().is_empty());
        store.clear().unwrap();
    }

    #[test]
    fn test_file_corruption_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileJobStore::new(&path);
        assert!(store.load().is_empty());

        fs::write(&path, r#"{"id": "job-1"}"#).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_file_clear_removes_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path().join("jobs.json"));
        store.save(&sample_jobs()).unwrap();

        store.clear().unwrap();

        assert!(!store.path().exists());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_memory_round_trip_and_clear() {
        let store = MemoryJobStore::new();
        let jobs = sample_jobs();

        store.save(&jobs).unwrap();
        assert_eq!(store.load(), jobs);
        assert_eq!(store.save_count(), 1);

        store.clear().unwrap();
        assert!(store.blob().is_none());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_memory_garbage_blob() {
        let store = MemoryJobStore::with_blob("[{]");
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_memory_poisoned_lock_fails_save() {
        let store = std::sync::Arc::new(MemoryJobStore::new());
        let held = store.clone();
        let _ = std::thread::spawn(move || {
            let _blob = held.blob.lock().unwrap();
            panic!("poison the slot");
        })
        .join();

        assert!(matches!(store.save(&sample_jobs()), Err(AppError::Store(_))));
        assert!(store.clear().is_err());
        assert_eq!(store.save_count(), 0);
    }
}
