use super::mapper::{effective_mapping, validate_mapping_overrides, ColumnMappingRule};
use crate::db::sql_utils::{
    strip_trailing_semicolons, validate_identifier, validate_identifiers, DEFAULT_SCHEMA,
};
use crate::db::InsertTarget;
use crate::error::{LoaderError, LoaderResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const MAX_CHUNK_SIZE: usize = 100_000;

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransferStartRequest {
    pub query: String,
    pub target_table: String,
    pub target_columns: Vec<String>,
    /// Target column -> source column. Unlisted target columns read the
    /// source column of the same name.
    #[serde(default)]
    pub source_to_target_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_true")]
    pub on_conflict_do_nothing: bool,
}

impl TransferStartRequest {
    pub fn normalized_query(&self) -> String {
        strip_trailing_semicolons(&self.query).to_string()
    }

    pub fn normalized_target_table(&self) -> String {
        self.target_table.trim().to_string()
    }

    pub fn label(&self) -> String {
        format!("Transfer to {}", self.normalized_target_table())
    }

    pub fn validate(&self) -> LoaderResult<TransferPlan> {
        let query = self.normalized_query();
        if query.is_empty() {
            return Err(LoaderError::validation("query is required"));
        }

        let target_table = self.normalized_target_table();
        if target_table.is_empty() {
            return Err(LoaderError::validation("target_table is required"));
        }
        validate_identifier(&target_table)?;

        if self.target_columns.is_empty() {
            return Err(LoaderError::validation("target_columns is required"));
        }
        validate_identifiers(&self.target_columns)?;
        validate_identifiers(&self.primary_key)?;
        validate_mapping_overrides(&self.source_to_target_mapping)?;

        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(LoaderError::Validation(format!(
                "chunk_size must be between 1 and {}",
                MAX_CHUNK_SIZE
            )));
        }

        let conflict_key = if self.on_conflict_do_nothing {
            self.primary_key.clone()
        } else {
            Vec::new()
        };

        Ok(TransferPlan {
            query,
            schema: DEFAULT_SCHEMA.to_string(),
            target_table,
            mapping: effective_mapping(&self.target_columns, &self.source_to_target_mapping),
            target_columns: self.target_columns.clone(),
            conflict_key,
            chunk_size: self.chunk_size,
        })
    }
}

/// Validated transfer handed to the background job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub query: String,
    pub schema: String,
    pub target_table: String,
    pub target_columns: Vec<String>,
    pub mapping: Vec<ColumnMappingRule>,
    /// Empty unless conflicts on the primary key are skipped.
    pub conflict_key: Vec<String>,
    pub chunk_size: usize,
}

impl TransferPlan {
    pub fn insert_target(&self, override_identity: bool) -> InsertTarget {
        InsertTarget {
            schema: self.schema.clone(),
            table: self.target_table.clone(),
            columns: self.target_columns.clone(),
            conflict_key: self.conflict_key.clone(),
            override_identity,
            text_json_columns: Vec::new(),
        }
    }
}
