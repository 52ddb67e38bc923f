use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use pq_app::{JobQueue, QueueConfig, QueueEvent};
use pq_core::{ConversationCatalog, NewJob};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = QueueConfig::load()?;
    info!(
        backend = %config.backend_url,
        store = %config.store_path().display(),
        "starting prompt test queue"
    );

    let queue = JobQueue::from_config(&config).await?;
    let mut events = queue.subscribe();

    if let Some(path) = &config.catalog_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let catalog = ConversationCatalog::from_json(&raw)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        info!(conversations = catalog.len(), "catalog loaded");
        queue.set_catalog(catalog).await?;
    }

    for arg in std::env::args().skip(1) {
        for job in load_jobs(Path::new(&arg))? {
            queue.enqueue(job).await?;
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut idle_check = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = idle_check.tick() => {
                if queue.is_idle().await {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted; queue state is saved and resumes on next start");
                break;
            }
        }
    }

    queue.shutdown().await;
    print_summary(&queue).await;
    Ok(())
}

fn load_jobs(path: &Path) -> anyhow::Result<Vec<NewJob>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading jobs file {}", path.display()))?;
    let jobs: Vec<NewJob> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing jobs file {}", path.display()))?;
    Ok(jobs)
}

fn log_event(event: &QueueEvent) {
    match event {
        QueueEvent::JobQueued { id } => info!(job_id = %id, "queued"),
        QueueEvent::JobSubmitted { local_id, job_id } => info!(%local_id, %job_id, "submitted"),
        QueueEvent::JobCompleted(job_id) => info!(%job_id, "done"),
        QueueEvent::JobFailed { job_id, from, error } => warn!(%job_id, %from, %error, "failed"),
        QueueEvent::JobRemoved(job_id) => info!(%job_id, "removed"),
        QueueEvent::QueueCleared => info!("queue cleared"),
        QueueEvent::MetadataReconciled { updated } => info!(updated, "metadata backfilled"),
    }
}

async fn print_summary(queue: &JobQueue) {
    let stats = queue.stats().await;
    println!(
        "Active: {} | Completed: {} ({} done, {} failed)",
        stats.active(),
        stats.finished(),
        stats.done,
        stats.error
    );

    for job in queue.jobs().await {
        let age = (Utc::now() - job.timestamp).num_seconds();
        let label = match (&job.center_name, &job.workflow_name) {
            (Some(center), Some(workflow)) => format!("{center} / {workflow}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => job.conversation_id.clone(),
        };
        println!("{} {:<40} {:<10} {:>6}s  {}", job.status.icon(), job.id, job.status.as_str(), age, label);
        if let Some(error) = &job.error {
            println!("    {error}");
        }
    }
}
