pub mod engine;
pub mod mapper;
pub mod models;
pub mod postgres;

pub use engine::{drive_transfer, run_transfer_job, ChunkSink, ChunkSource, TransferControl};
pub use models::{TransferPlan, TransferStartRequest};
