// =====================================================
// DATABASE MODULE
// PostgreSQL access shared by the job engines and the request surface
// =====================================================

pub mod connections;
pub mod helpers;
pub mod metadata;
pub mod sql_utils;
pub mod writer;

pub use connections::{ConnectionManager, ConnectionSettings, SharedConnection};
pub use writer::{InsertTarget, JsonRow};
