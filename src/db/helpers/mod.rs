// =====================================================
// HELPERS MODULE
// Generic utility functions (type conversion, string utilities)
// =====================================================

use base64::Engine as _;

/// Convert i64 to u64, returning 0 for negative values
pub fn i64_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Collapse multiple whitespace characters into single spaces
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Re-encode PostgreSQL hex bytea text (`\x0a0b`) as `base64:<data>`.
pub fn bytea_hex_to_base64(value: &str) -> Option<String> {
    let digits = value.strip_prefix("\\x")?;
    let bytes = hex::decode(digits).ok()?;
    Some(format!(
        "base64:{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}
