use pq_core::JobStatus;

/// Notifications for the rendering layer. Every event is emitted after the
/// corresponding change has been saved.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    JobQueued {
        id: String,
    },
    JobSubmitted {
        local_id: String,
        job_id: String,
    },
    JobCompleted(String),
    JobFailed {
        job_id: String,
        from: JobStatus,
        error: String,
    },
    JobRemoved(String),
    QueueCleared,
    MetadataReconciled {
        updated: usize,
    },
}
