//! Asynchronous split jobs: identity and state, and the manager that runs
//! them in the background under a concurrency limit.

pub mod manager;
pub mod model;

pub use manager::{run_split, JobManager, JobManagerConfig};
pub use model::{JobFailure, JobId, JobRecord, JobState, JobStatusView, SubmittedSplit};
