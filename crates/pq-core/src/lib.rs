pub mod catalog;
pub mod error;
pub mod job;

pub use catalog::{ConversationCatalog, ConversationInfo};
pub use error::JobError;
pub use job::{local_job_id, JobOutcome, JobRecord, JobStatus, NewJob};
