use crate::db::sql_utils::{validate_identifier, validate_identifiers, DEFAULT_SCHEMA};
use crate::db::InsertTarget;
use crate::db_types::TableSchema;
use crate::error::{LoaderError, LoaderResult};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Json,
}

impl FileKind {
    pub fn from_filename(filename: &str) -> LoaderResult<Self> {
        let lowered = filename.trim().to_lowercase();
        if lowered.ends_with(".csv") {
            Ok(FileKind::Csv)
        } else if lowered.ends_with(".json") {
            Ok(FileKind::Json)
        } else {
            Err(LoaderError::validation("Only CSV or JSON supported"))
        }
    }
}

/// Upload parameters as submitted, before the target table is consulted.
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    pub table: String,
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
    /// Adopt the table's declared key when `primary_key` is empty.
    pub auto_primary_key: bool,
    pub filename: String,
}

impl LoadRequest {
    /// Checks that need no store round trip.
    pub fn validate(&self) -> LoaderResult<FileKind> {
        validate_identifier(&self.table)?;
        validate_identifiers(&self.columns)?;
        validate_identifiers(&self.primary_key)?;
        if self.columns.is_empty() {
            return Err(LoaderError::validation("columns is required"));
        }
        FileKind::from_filename(&self.filename)
    }

    /// Reconcile the request with the table's actual shape.
    pub fn resolve(&self, schema: &TableSchema) -> LoaderResult<LoadPlan> {
        let file_kind = self.validate()?;
        if !schema.exists() {
            return Err(LoaderError::NotFound("table not found".to_string()));
        }

        let known = schema.attributes.iter().collect::<HashSet<_>>();
        let unknown = self
            .columns
            .iter()
            .filter(|column| !known.contains(column))
            .cloned()
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            return Err(LoaderError::Validation(format!(
                "Invalid column(s) for table: {}",
                unknown.join(", ")
            )));
        }

        let mut primary_key = self.primary_key.clone();
        let explicit_primary_key = !primary_key.is_empty();
        if explicit_primary_key {
            let requested = primary_key.iter().collect::<HashSet<_>>();
            let declared = schema.primary_key.iter().collect::<HashSet<_>>();
            if requested != declared {
                return Err(LoaderError::Validation(format!(
                    "primary_key does not match table primary key. Expected: {}",
                    if schema.primary_key.is_empty() {
                        "None".to_string()
                    } else {
                        schema.primary_key.join(", ")
                    }
                )));
            }

            let missing = primary_key
                .iter()
                .filter(|column| !self.columns.contains(column))
                .cloned()
                .collect::<Vec<_>>();
            if !missing.is_empty() {
                return Err(LoaderError::Validation(format!(
                    "primary_key must be included in columns: {}",
                    missing.join(", ")
                )));
            }
        } else if self.auto_primary_key {
            primary_key = schema.primary_key.clone();
        }

        Ok(LoadPlan {
            schema: DEFAULT_SCHEMA.to_string(),
            table: self.table.clone(),
            columns: self.columns.clone(),
            primary_key,
            explicit_primary_key,
            file_kind,
        })
    }

    pub fn label(&self) -> String {
        format!("Upload to {}", self.table)
    }
}

/// Validated load handed to the background job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
    /// Empty means no dedup: every row is inserted.
    pub primary_key: Vec<String>,
    pub explicit_primary_key: bool,
    pub file_kind: FileKind,
}

impl LoadPlan {
    pub fn insert_target(&self, columns: Vec<String>, override_identity: bool) -> InsertTarget {
        InsertTarget {
            schema: self.schema.clone(),
            table: self.table.clone(),
            columns,
            conflict_key: self.primary_key.clone(),
            override_identity,
            text_json_columns: Vec::new(),
        }
    }
}
