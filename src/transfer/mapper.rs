use crate::db::metadata::ResultColumn;
use crate::db::sql_utils::validate_identifier;
use crate::db::JsonRow;
use crate::error::LoaderResult;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One target column and the source column it reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMappingRule {
    pub target_column: String,
    pub source_column: String,
}

pub fn validate_mapping_overrides(overrides: &BTreeMap<String, String>) -> LoaderResult<()> {
    for (target, source) in overrides {
        validate_identifier(target)?;
        validate_identifier(source)?;
    }
    Ok(())
}

/// Every requested target column, mapped to its override or to itself.
/// Overrides for columns that were not requested are ignored.
pub fn effective_mapping(
    target_columns: &[String],
    overrides: &BTreeMap<String, String>,
) -> Vec<ColumnMappingRule> {
    target_columns
        .iter()
        .map(|target| ColumnMappingRule {
            target_column: target.clone(),
            source_column: overrides.get(target).unwrap_or(target).clone(),
        })
        .collect()
}

/// `(target, source)` pairs whose source column is absent from the result.
pub fn missing_source_columns(
    rules: &[ColumnMappingRule],
    source_columns: &[String],
) -> Vec<(String, String)> {
    rules
        .iter()
        .filter(|rule| !source_columns.contains(&rule.source_column))
        .map(|rule| (rule.target_column.clone(), rule.source_column.clone()))
        .collect()
}

/// Target json/jsonb columns fed from a character-typed source column. Their
/// values arrive as JSON strings holding JSON text and must be parsed.
pub fn text_json_targets(
    rules: &[ColumnMappingRule],
    source_columns: &[ResultColumn],
    target_json_columns: &[String],
) -> Vec<String> {
    rules
        .iter()
        .filter(|rule| target_json_columns.contains(&rule.target_column))
        .filter(|rule| {
            source_columns
                .iter()
                .any(|column| column.name == rule.source_column && column.is_text_like())
        })
        .map(|rule| rule.target_column.clone())
        .collect()
}

/// Re-key a source row by target column, in target column order.
pub fn project_row(rules: &[ColumnMappingRule], source_row: &JsonRow) -> JsonRow {
    rules
        .iter()
        .map(|rule| {
            (
                rule.target_column.clone(),
                source_row
                    .get(&rule.source_column)
                    .cloned()
                    .unwrap_or(Value::Null),
            )
        })
        .collect()
}
