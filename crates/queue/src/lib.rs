pub mod error;
pub mod job;
pub mod memory;
pub mod pg;
pub mod queue;
pub mod worker;

pub use error::{JobError, QueueError};
pub use job::{HealthReport, HealthStatus, Job, JobState, QueueStats, SendOptions};
pub use memory::MemoryQueue;
pub use pg::PgQueue;
pub use queue::JobQueue;
pub use worker::{JobHandler, MaintenanceOptions, WorkOptions, Worker};
