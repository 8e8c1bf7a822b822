// =====================================================
// CONFIGURATION MODULE
// Command line / environment settings for the service
// =====================================================

use crate::db::connections::{ConnectionSettings, DEFAULT_CONNECT_TIMEOUT_SECS};
use clap::Parser;

pub const DEFAULT_JOB_RETENTION_HOURS: u64 = 2;
pub const DEFAULT_JSON_BATCH_SIZE: usize = 1000;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pgferry",
    version,
    about = "Bulk file loader and chunked cross-database transfer service"
)]
pub struct ServiceConfig {
    /// Address to bind the HTTP listener on
    #[arg(long, env = "PGFERRY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP listener on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Hours a finished job stays visible before it is purged
    #[arg(long, env = "PGFERRY_JOB_RETENTION_HOURS", default_value_t = DEFAULT_JOB_RETENTION_HOURS)]
    pub job_retention_hours: u64,

    /// Server-side statement timeout in seconds for every session (0 disables)
    #[arg(long, env = "PGFERRY_STATEMENT_TIMEOUT_SECS", default_value_t = 0)]
    pub statement_timeout_secs: u64,

    /// Connect timeout in seconds
    #[arg(long, env = "PGFERRY_CONNECT_TIMEOUT_SECS", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,

    /// Maximum accepted upload size in megabytes
    #[arg(long, env = "PGFERRY_MAX_UPLOAD_MB", default_value_t = 256)]
    pub max_upload_mb: usize,

    /// Rows per INSERT statement when loading JSON files
    #[arg(long, env = "PGFERRY_JSON_BATCH_SIZE", default_value_t = DEFAULT_JSON_BATCH_SIZE)]
    pub json_batch_size: usize,

    /// Target store connection URL configured at startup
    #[arg(long, env = "TARGET_DATABASE_URL")]
    pub target_database_url: Option<String>,

    /// Source store connection URL configured at startup
    #[arg(long, env = "SOURCE_DATABASE_URL")]
    pub source_database_url: Option<String>,
}

impl ServiceConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            job_retention: retention_from_hours(self.job_retention_hours),
            json_batch_size: self.json_batch_size.max(1),
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            statement_timeout_secs: self.statement_timeout_secs,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}

/// Clamp an operator supplied hour count into a representable duration.
pub fn retention_from_hours(hours: u64) -> chrono::Duration {
    i64::try_from(hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .unwrap_or_else(|| chrono::Duration::weeks(52 * 100))
}

/// Settings the job engines read at runtime.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub job_retention: chrono::Duration,
    pub json_batch_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            job_retention: chrono::Duration::hours(DEFAULT_JOB_RETENTION_HOURS as i64),
            json_batch_size: DEFAULT_JSON_BATCH_SIZE,
        }
    }
}
