pub mod engine;
pub mod models;
pub mod parser;

pub use engine::run_load_job;
pub use models::{FileKind, LoadPlan, LoadRequest};
