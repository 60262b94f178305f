//! Type mapping from source wire types to target storage types.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

/// Fixed width of every character column created on the target.
pub const VARCHAR2_WIDTH: u32 = 4000;

/// Source column wire type.
///
/// Codes follow the SQL type numbering Hive drivers report
/// (`BOOLEAN` = 16, `BIGINT` = -5, `VARCHAR` = 12, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Decimal,
    Numeric,
    Varchar,
    /// Any type without a target mapping (dates, binary, complex types, ...).
    Other(i32),
}

impl SourceType {
    /// Decode a wire type code.
    pub fn from_code(code: i32) -> Self {
        match code {
            16 => SourceType::Boolean,
            -6 => SourceType::TinyInt,
            5 => SourceType::SmallInt,
            4 => SourceType::Integer,
            -5 => SourceType::BigInt,
            6 => SourceType::Float,
            7 => SourceType::Real,
            8 => SourceType::Double,
            3 => SourceType::Decimal,
            2 => SourceType::Numeric,
            12 => SourceType::Varchar,
            other => SourceType::Other(other),
        }
    }

    /// Wire type code.
    pub fn code(&self) -> i32 {
        match self {
            SourceType::Boolean => 16,
            SourceType::TinyInt => -6,
            SourceType::SmallInt => 5,
            SourceType::Integer => 4,
            SourceType::BigInt => -5,
            SourceType::Float => 6,
            SourceType::Real => 7,
            SourceType::Double => 8,
            SourceType::Decimal => 3,
            SourceType::Numeric => 2,
            SourceType::Varchar => 12,
            SourceType::Other(code) => *code,
        }
    }

    /// Whether values of this type are integral.
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            SourceType::TinyInt | SourceType::SmallInt | SourceType::Integer | SourceType::BigInt
        )
    }
}

/// Target storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    Number,
    Varchar2,
}

impl TargetType {
    /// DDL fragment for a column of this type.
    pub fn ddl(&self) -> String {
        match self {
            TargetType::Number => "NUMBER".to_string(),
            TargetType::Varchar2 => format!("VARCHAR2({})", VARCHAR2_WIDTH),
        }
    }
}

/// Map a source wire type to its target storage type.
///
/// Booleans and all numeric types map to `NUMBER`, character data to
/// `VARCHAR2(4000)`. Anything else is `UnsupportedType`; the returned error
/// carries an empty column name for the caller to fill in.
pub fn map_type(source_type: SourceType) -> Result<TargetType> {
    match source_type {
        SourceType::Boolean
        | SourceType::TinyInt
        | SourceType::SmallInt
        | SourceType::Integer
        | SourceType::BigInt
        | SourceType::Float
        | SourceType::Real
        | SourceType::Double
        | SourceType::Decimal
        | SourceType::Numeric => Ok(TargetType::Number),

        SourceType::Varchar => Ok(TargetType::Varchar2),

        SourceType::Other(type_code) => Err(TransferError::UnsupportedType {
            column: String::new(),
            type_code,
        }),
    }
}
