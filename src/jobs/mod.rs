pub mod models;
pub mod registry;

pub use models::{JobKind, JobOutcome, JobStatus, JobStatusView, RunningJob};
pub use registry::{CancelOutcome, JobRegistry};
