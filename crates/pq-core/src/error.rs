use thiserror::Error;
use crate::job::JobStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Illegal job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job {id} is already {status}")]
    Terminal { id: String, status: JobStatus },
}
