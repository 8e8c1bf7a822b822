// =====================================================
// UPLOAD PARSING
// CSV header extraction and JSON row projection
// =====================================================

use crate::db::JsonRow;
use crate::error::{LoaderError, LoaderResult};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Parse only the first line of a CSV payload as its header.
pub fn read_csv_header(bytes: &[u8]) -> LoaderResult<Vec<String>> {
    let body = strip_bom(bytes);
    let first_line = body.split(|byte| *byte == b'\n').next().unwrap_or_default();
    let first_line = std::str::from_utf8(first_line)
        .map_err(|_| LoaderError::validation("CSV header is not valid UTF-8"))?;
    if first_line.trim().is_empty() {
        return Err(LoaderError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(first_line.as_bytes());
    let record = reader.records().next().transpose()?;

    let header = record
        .map(|record| {
            record
                .iter()
                .map(str::trim)
                .filter(|column| !column.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if header.is_empty() {
        return Err(LoaderError::EmptyHeader);
    }
    Ok(header)
}

/// Header columns that were requested, in header order.
pub fn effective_columns(header: &[String], requested: &[String]) -> Vec<String> {
    header
        .iter()
        .filter(|column| requested.contains(column))
        .cloned()
        .collect()
}

pub fn missing_key_columns(effective: &[String], primary_key: &[String]) -> Vec<String> {
    primary_key
        .iter()
        .filter(|column| !effective.contains(column))
        .cloned()
        .collect()
}

/// Parse a JSON array of flat objects and keep exactly `columns`, in order.
pub fn parse_json_rows(bytes: &[u8], columns: &[String]) -> LoaderResult<Vec<JsonRow>> {
    let documents = serde_json::from_slice::<Vec<JsonRow>>(strip_bom(bytes))?;
    documents
        .into_iter()
        .enumerate()
        .map(|(index, mut document)| {
            let mut row = JsonRow::new();
            for column in columns {
                let value = document
                    .remove(column)
                    .ok_or_else(|| LoaderError::MissingField {
                        row: index + 1,
                        column: column.clone(),
                    })?;
                row.insert(column.clone(), value);
            }
            Ok(row)
        })
        .collect()
}
