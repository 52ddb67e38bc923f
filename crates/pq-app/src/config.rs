use std::env;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::Context;

/// File name of the persisted queue slot inside the store directory
pub const STORE_SLOT: &str = "prompt-test-jobs.json";

#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    pub backend_url: String,
    pub store_dir: PathBuf,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub catalog_path: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            store_dir: PathBuf::from("data"),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            catalog_path: None,
        }
    }
}

impl QueueConfig {
    /// Read configuration from the environment, after loading `.env` if one exists.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match lookup(key) {
                Some(raw) => {
                    let secs: u64 = raw
                        .trim()
                        .parse()
                        .with_context(|| format!("{key} must be a whole number of seconds, got '{raw}'"))?;
                    anyhow::ensure!(secs > 0, "{key} must be greater than zero");
                    Ok(Duration::from_secs(secs))
                }
                None => Ok(default),
            }
        };

        Ok(Self {
            backend_url: lookup("PQ_BACKEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.backend_url),
            store_dir: lookup("PQ_STORE_DIR").map(PathBuf::from).unwrap_or(defaults.store_dir),
            poll_interval: secs("PQ_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            request_timeout: secs("PQ_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            catalog_path: lookup("PQ_CATALOG_PATH").map(PathBuf::from),
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_dir.join(STORE_SLOT)
    }
}
