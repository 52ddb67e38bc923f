pub mod config;
pub mod error;
pub mod events;
pub mod queue;

#[cfg(test)]
mod test_support;

pub use config::QueueConfig;
pub use error::AppError;
pub use events::QueueEvent;
pub use queue::backend::{HttpBackend, JobBackend};
pub use queue::store::{FileJobStore, JobStore, MemoryJobStore};
pub use queue::{JobQueue, QueueStats};
