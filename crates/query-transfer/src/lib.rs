//! # query-transfer
//!
//! Bulk transfer of a query result from one database into a newly created
//! table in another. The reference pairing is Hive to Oracle over ODBC.
//!
//! The engine:
//!
//! - **Infers the target schema** from the source cursor's column metadata
//! - **Creates the target table**, with a pluggable retry policy
//! - **Streams rows in pages** without holding the result set in memory
//! - **Inserts in batches** with a commit every N batches
//! - **Classifies failures**, including a target session killed mid-load
//!
//! ## Example
//!
//! ```rust,no_run
//! use query_transfer::{Config, OdbcSource, OdbcTarget, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> query_transfer::Result<()> {
//!     let config = Config::load("transfer.yaml")?;
//!     let options = config.transfer_options()?;
//!     let mut source = OdbcSource::connect(&config.source_settings()).await?;
//!     let mut target = OdbcTarget::connect(&config.target_settings()).await?;
//!     let summary = Orchestrator::new(options).run(&mut source, &mut target).await?;
//!     println!("Transferred {} rows", summary.rows_processed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod provision;
pub mod schema;
pub mod source;
pub mod target;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use crate::core::{
    ColumnDescriptor, RetryDecision, RetryPolicy, Row, SourceColumn, SourceConnection,
    SourceCursor, SqlValue, TargetConnection,
};
pub use config::{Config, ConnectionSettings, TransferOptions};
pub use error::{Result, TransferError};
pub use orchestrator::{run_transfer, Orchestrator, TransferSummary, PRODUCT_NAME};
pub use provision::{NeverRetry, ScriptedRetry};
pub use source::{MemoryPaging, MemorySource, OdbcSource, PagedCursor, RowEncoding};
pub use target::{MemoryTarget, MemoryTargetLog, OdbcTarget};
pub use transfer::{BatchLoader, LoaderSettings, LoaderState, LoadFailure, TransferCounters};
pub use typemap::{map_type, SourceType, TargetType};
