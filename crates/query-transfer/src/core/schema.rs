//! Column metadata types for the source result set and the target table.

use serde::{Deserialize, Serialize};

use crate::typemap::{SourceType, TargetType};

/// A result-set column as reported by the source cursor's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    /// Column label, exactly as the source reports it.
    pub name: String,

    /// Wire type of the column.
    pub source_type: SourceType,
}

impl SourceColumn {
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
        }
    }
}

/// Resolved definition of one target column.
///
/// Produced once per result-set column by the schema synthesizer and never
/// modified afterwards. The position of a descriptor in its sequence is
/// both the source column ordinal and the insert parameter ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Normalized target column name.
    pub name: String,

    /// Wire type of the originating source column.
    pub source_type: SourceType,

    /// Storage type on the target.
    pub target_type: TargetType,

    /// DDL fragment for the column type, e.g. `VARCHAR2(4000)`.
    pub target_ddl: String,
}

impl ColumnDescriptor {
    /// Render the column definition used inside CREATE TABLE.
    pub fn definition(&self) -> String {
        format!("{} {}", self.name, self.target_ddl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_definition() {
        let col = ColumnDescriptor {
            name: "total".into(),
            source_type: SourceType::Double,
            target_type: TargetType::Number,
            target_ddl: "NUMBER".into(),
        };
        assert_eq!(col.definition(), "total NUMBER");
    }
}
