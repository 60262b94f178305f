//! In-process source connection.
//!
//! Serves a fixed result set through any of the three cursor capabilities,
//! with optional injected failures. Used by the test suite and for dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::schema::SourceColumn;
use crate::core::traits::{SourceConnection, SourceCursor};
use crate::core::value::Row;
use crate::error::{Result, TransferError};

use super::codec::{encode_row, RowEncoding};

/// Which retrieval capability the in-memory cursor advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPaging {
    /// Accepts a fetch size.
    Native,
    /// Rejects a fetch size, serves fetch-N pages in the given encoding.
    FetchN(RowEncoding),
    /// Supports neither.
    Unpaged,
}

/// Call counters shared between a [`MemorySource`] and its cursors.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceStats {
    queries: Arc<AtomicUsize>,
    fetch_row_calls: Arc<AtomicUsize>,
    fetch_n_calls: Arc<AtomicUsize>,
}

impl MemorySourceStats {
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn fetch_row_calls(&self) -> usize {
        self.fetch_row_calls.load(Ordering::Relaxed)
    }

    pub fn fetch_n_calls(&self) -> usize {
        self.fetch_n_calls.load(Ordering::Relaxed)
    }
}

/// Source connection backed by a vector of rows.
#[derive(Debug, Clone)]
pub struct MemorySource {
    columns: Vec<SourceColumn>,
    rows: Vec<Row>,
    paging: MemoryPaging,
    empty_string_terminator: bool,
    query_error: Option<String>,
    fetch_error_at: Option<usize>,
    stats: MemorySourceStats,
}

impl MemorySource {
    pub fn new(columns: Vec<SourceColumn>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            paging: MemoryPaging::Native,
            empty_string_terminator: false,
            query_error: None,
            fetch_error_at: None,
            stats: MemorySourceStats::default(),
        }
    }

    pub fn with_paging(mut self, paging: MemoryPaging) -> Self {
        self.paging = paging;
        self
    }

    /// Signal the end of a fetch-N result with a single empty payload
    /// instead of an empty page.
    pub fn with_empty_string_terminator(mut self) -> Self {
        self.empty_string_terminator = true;
        self
    }

    /// Make `execute_query` fail with `message`.
    pub fn fail_query(mut self, message: impl Into<String>) -> Self {
        self.query_error = Some(message.into());
        self
    }

    /// Make fetching the row at 0-based `index` fail.
    pub fn fail_fetch_at(mut self, index: usize) -> Self {
        self.fetch_error_at = Some(index);
        self
    }

    pub fn stats(&self) -> MemorySourceStats {
        self.stats.clone()
    }
}

#[async_trait]
impl SourceConnection for MemorySource {
    async fn execute_query(&mut self, _sql: &str) -> Result<Box<dyn SourceCursor>> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = &self.query_error {
            return Err(TransferError::source_error(message.clone()));
        }

        Ok(Box::new(MemoryCursor {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            position: 0,
            paging: self.paging,
            empty_string_terminator: self.empty_string_terminator,
            fetch_error_at: self.fetch_error_at,
            stats: self.stats.clone(),
        }))
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

struct MemoryCursor {
    columns: Vec<SourceColumn>,
    rows: Vec<Row>,
    position: usize,
    paging: MemoryPaging,
    empty_string_terminator: bool,
    fetch_error_at: Option<usize>,
    stats: MemorySourceStats,
}

impl MemoryCursor {
    fn check_injected_failure(&self) -> Result<()> {
        if self.fetch_error_at == Some(self.position) {
            return Err(TransferError::source_error(format!(
                "injected fetch failure at row {}",
                self.position
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceCursor for MemoryCursor {
    fn columns(&self) -> &[SourceColumn] {
        &self.columns
    }

    fn set_fetch_size(&mut self, _n: usize) -> Result<()> {
        match self.paging {
            MemoryPaging::Native => Ok(()),
            _ => Err(TransferError::source_error("fetch size not supported")),
        }
    }

    async fn fetch_row(&mut self) -> Result<Option<Row>> {
        self.stats.fetch_row_calls.fetch_add(1, Ordering::Relaxed);
        self.check_injected_failure()?;
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn fetch_n_encoding(&self) -> Option<RowEncoding> {
        match self.paging {
            MemoryPaging::FetchN(encoding) => Some(encoding),
            _ => None,
        }
    }

    async fn fetch_n(&mut self, n: usize) -> Result<Vec<String>> {
        let encoding = match self.paging {
            MemoryPaging::FetchN(encoding) => encoding,
            _ => return Err(TransferError::source_error("fetch-N not supported")),
        };
        self.stats.fetch_n_calls.fetch_add(1, Ordering::Relaxed);

        let mut page = Vec::with_capacity(n);
        while page.len() < n && self.position < self.rows.len() {
            self.check_injected_failure()?;
            page.push(encode_row(
                encoding,
                &self.rows[self.position],
                &self.columns,
            ));
            self.position += 1;
        }

        if page.is_empty() && self.empty_string_terminator {
            page.push(String::new());
        }
        Ok(page)
    }
}
