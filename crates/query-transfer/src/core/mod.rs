//! Core abstractions shared by the engine and its connectors.
//!
//! - [`schema`]: source column and target column descriptor types
//! - [`value`]: typed SQL values and rows
//! - [`traits`]: source, target and retry-policy traits
//! - [`identifier`]: identifier validation and column name normalization

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnDescriptor, SourceColumn};
pub use traits::{RetryDecision, RetryPolicy, SourceConnection, SourceCursor, TargetConnection};
pub use value::{Row, SqlValue};
