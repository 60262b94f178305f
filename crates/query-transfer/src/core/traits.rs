//! Core traits for the transfer engine.
//!
//! The engine never talks to a driver directly. It sees:
//!
//! - [`SourceConnection`] / [`SourceCursor`]: run the query and read rows
//! - [`TargetConnection`]: create the table and load it with batched inserts
//! - [`RetryPolicy`]: decide whether a failed table creation is retried
//!
//! Concrete implementations live in `source::odbc`, `target::odbc` (real
//! drivers) and `source::memory`, `target::memory` (in-process, used by the
//! test suite).

use async_trait::async_trait;

use crate::error::{Result, TransferError};
use crate::source::codec::RowEncoding;

use super::schema::SourceColumn;
use super::value::{Row, SqlValue};

/// An open session against the source system.
#[async_trait]
pub trait SourceConnection: Send {
    /// Execute a query and return a forward-only cursor over its result.
    async fn execute_query(&mut self, sql: &str) -> Result<Box<dyn SourceCursor>>;

    /// Get the database type identifier (e.g., "hive").
    fn db_type(&self) -> &str;
}

/// Forward-only cursor over a query result.
///
/// A cursor supports at least one of two retrieval styles:
///
/// - row at a time via [`fetch_row`](SourceCursor::fetch_row), optionally
///   with a driver-side prefetch size set by
///   [`set_fetch_size`](SourceCursor::set_fetch_size)
/// - the legacy fetch-N primitive, which returns up to N rows per call as
///   pre-serialized payloads in the encoding reported by
///   [`fetch_n_encoding`](SourceCursor::fetch_n_encoding)
///
/// [`PagedCursor`](crate::source::PagedCursor) checks which one is
/// available and hides the difference.
#[async_trait]
pub trait SourceCursor: Send {
    /// Column metadata, in result-set order.
    fn columns(&self) -> &[SourceColumn];

    /// Ask the driver to prefetch `n` rows per round trip.
    ///
    /// Returns an error when the driver does not support it.
    fn set_fetch_size(&mut self, n: usize) -> Result<()>;

    /// Fetch the next row, or `None` when the result is exhausted.
    async fn fetch_row(&mut self) -> Result<Option<Row>>;

    /// Wire encoding of fetch-N payloads, or `None` when fetch-N is not
    /// available on this cursor.
    fn fetch_n_encoding(&self) -> Option<RowEncoding> {
        None
    }

    /// Fetch up to `n` serialized rows.
    ///
    /// An empty vector, or a vector whose first payload is the empty string,
    /// means the result is exhausted.
    async fn fetch_n(&mut self, _n: usize) -> Result<Vec<String>> {
        Err(TransferError::source_error(
            "fetch-N is not supported by this cursor",
        ))
    }
}

/// An open session against the target system.
///
/// Autocommit is off: rows become visible only at [`commit`](TargetConnection::commit).
#[async_trait]
pub trait TargetConnection: Send {
    /// Label the session for the target's monitoring views.
    async fn initialize_session(&mut self, module: &str, action: &str) -> Result<()>;

    /// Execute a DDL statement.
    async fn execute_ddl(&mut self, sql: &str) -> Result<()>;

    /// Prepare the parameterized insert statement used by the batch methods.
    async fn prepare_insert(&mut self, sql: &str, column_count: usize) -> Result<()>;

    /// Bind a value to the 1-based parameter `position` of the pending row.
    fn bind_param(&mut self, position: usize, value: SqlValue) -> Result<()>;

    /// Append the pending row to the current batch.
    fn add_batch(&mut self) -> Result<()>;

    /// Execute the current batch. Returns the number of rows sent.
    async fn execute_batch(&mut self) -> Result<u64>;

    /// Discard the current batch.
    fn clear_batch(&mut self);

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Get the database type identifier (e.g., "oracle").
    fn db_type(&self) -> &str;
}

/// Outcome of a [`RetryPolicy`] decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-issue the failed operation.
    Retry,
    /// Give up and report the failure.
    Abort,
}

/// Decides whether a failed operation is attempted again.
///
/// `attempt` is 1 for the first failure. Implementations may wait on an
/// operator, so the decision is awaited.
#[async_trait]
pub trait RetryPolicy: Send {
    async fn decide(&mut self, attempt: u32, error: &TransferError) -> RetryDecision;
}
