//! Target schema synthesis from source result-set metadata.

use tracing::debug;

use crate::core::identifier::normalize_column_name;
use crate::core::schema::{ColumnDescriptor, SourceColumn};
use crate::error::{Result, TransferError};
use crate::typemap::map_type;

/// Derive one target column descriptor per source column, in order.
///
/// Fails on the first column whose type has no mapping; no partial schema
/// is returned.
pub fn synthesize(columns: &[SourceColumn]) -> Result<Vec<ColumnDescriptor>> {
    columns
        .iter()
        .map(|column| {
            let target_type = map_type(column.source_type).map_err(|e| match e {
                TransferError::UnsupportedType { type_code, .. } => {
                    TransferError::UnsupportedType {
                        column: column.name.clone(),
                        type_code,
                    }
                }
                other => other,
            })?;

            let descriptor = ColumnDescriptor {
                name: normalize_column_name(&column.name),
                source_type: column.source_type,
                target_type,
                target_ddl: target_type.ddl(),
            };
            debug!(
                "Column '{}' ({:?}) -> {} {}",
                column.name, column.source_type, descriptor.name, descriptor.target_ddl
            );
            Ok(descriptor)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::{SourceType, TargetType};

    #[test]
    fn test_synthesize_preserves_order_and_normalizes() {
        let cols = vec![
            SourceColumn::new("_c0", SourceType::BigInt),
            SourceColumn::new("name", SourceType::Varchar),
            SourceColumn::new("__flag", SourceType::Boolean),
        ];
        let descriptors = synthesize(&cols).unwrap();

        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["c0", "name", "_flag"]);
        assert_eq!(descriptors[0].target_type, TargetType::Number);
        assert_eq!(descriptors[1].target_ddl, "VARCHAR2(4000)");
        assert_eq!(descriptors[2].source_type, SourceType::Boolean);
    }

    #[test]
    fn test_synthesize_fails_on_first_unsupported_column() {
        let cols = vec![
            SourceColumn::new("id", SourceType::Integer),
            SourceColumn::new("created", SourceType::Other(93)),
            SourceColumn::new("payload", SourceType::Other(-2)),
        ];
        match synthesize(&cols) {
            Err(TransferError::UnsupportedType { column, type_code }) => {
                assert_eq!(column, "created");
                assert_eq!(type_code, 93);
            }
            other => panic!("expected UnsupportedType, got {:?}", other),
        }
    }

    #[test]
    fn test_synthesize_empty_result_set() {
        assert!(synthesize(&[]).unwrap().is_empty());
    }
}
