// =====================================================
// COMMON DATABASE TYPES AND STRUCTURES
// =====================================================

use crate::config::EngineSettings;
use crate::db::connections::{ConnectionManager, ConnectionSettings};
use crate::jobs::registry::JobRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// --- Store Roles ---
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StoreRole {
    Source,
    Target,
}

impl StoreRole {
    pub fn label(&self) -> &'static str {
        match self {
            StoreRole::Source => "Source",
            StoreRole::Target => "Target",
        }
    }

    pub fn not_configured_message(&self) -> String {
        format!("{} database not configured", self.label())
    }
}

// --- State Management ---
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionManager>,
    pub jobs: Arc<JobRegistry>,
    pub settings: Arc<EngineSettings>,
}

impl AppState {
    pub fn new(settings: EngineSettings, connection_settings: ConnectionSettings) -> Self {
        Self {
            connections: Arc::new(ConnectionManager::new(connection_settings)),
            jobs: Arc::new(JobRegistry::new()),
            settings: Arc::new(settings),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(EngineSettings::default(), ConnectionSettings::default())
    }
}

// --- Result Structures ---
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    /// A cached connection exists and is either leased or answered a ping.
    pub connected: bool,
    pub database_url: Option<String>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub attributes: Vec<String>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn exists(&self) -> bool {
        !self.attributes.is_empty()
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ReadQueryResult {
    pub status: String,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub total_count: u64,
    pub returned_count: usize,
}
