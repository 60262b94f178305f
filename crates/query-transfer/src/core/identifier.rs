//! Identifier validation and name normalization.
//!
//! Target identifiers are interpolated into DDL and DML text unquoted, so
//! they cannot be bound as parameters. Every name that reaches generated SQL
//! passes through [`validate_identifier`] first.

use crate::error::{Result, TransferError};

/// Maximum identifier length accepted by the target (Oracle 12.2+: 128 bytes).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is written into generated SQL.
///
/// Rejects empty names, names containing null bytes, and names longer than
/// the target's limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TransferError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(TransferError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(TransferError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Normalize a source column label into a target column name.
///
/// Hive labels columns produced by expressions `_c0`, `_c1`, ...; a leading
/// underscore is not a legal start for an unquoted Oracle identifier, so
/// exactly one is removed. Names without a leading underscore are returned
/// unchanged.
///
/// ```
/// use query_transfer::core::identifier::normalize_column_name;
///
/// assert_eq!(normalize_column_name("_c0"), "c0");
/// assert_eq!(normalize_column_name("__id"), "_id");
/// assert_eq!(normalize_column_name("id"), "id");
/// ```
pub fn normalize_column_name(name: &str) -> String {
    name.strip_prefix('_').unwrap_or(name).to_string()
}

/// Build the `[schema.]table` reference used in generated statements.
pub fn qualify_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) if !schema.is_empty() => format!("{}.{}", schema, table),
        _ => table.to_string(),
    }
}
