//! Paged consumption of a source cursor.
//!
//! [`PagedCursor`] hides how a driver delivers rows. A capability check run once at
//! construction selects the mode:
//!
//! 1. The driver accepts a prefetch size: rows pass straight through.
//! 2. The driver exposes the legacy fetch-N primitive: pages of serialized
//!    rows are requested explicitly and decoded locally.
//! 3. Neither: rows pass straight through, one round trip per row.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, warn};

use crate::core::schema::SourceColumn;
use crate::core::traits::SourceCursor;
use crate::core::value::Row;
use crate::error::{Result, TransferError};

use super::codec::{decode_row, RowEncoding};

/// Retrieval mode chosen by the capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    /// Driver-side prefetch, rows fetched one by one.
    Native,
    /// Explicit fetch-N pages in the given encoding.
    FetchN(RowEncoding),
    /// No paging support.
    Unpaged,
}

impl fmt::Display for PagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PagingMode::Native => write!(f, "native"),
            PagingMode::FetchN(RowEncoding::List) => write!(f, "fetch-n (list)"),
            PagingMode::FetchN(RowEncoding::Struct) => write!(f, "fetch-n (struct)"),
            PagingMode::Unpaged => write!(f, "unpaged"),
        }
    }
}

/// Forward-only row iterator over a source cursor, fetching in pages.
pub struct PagedCursor {
    cursor: Box<dyn SourceCursor>,
    mode: PagingMode,
    page_size: usize,
    page: VecDeque<String>,
    current: Option<Row>,
    exhausted: bool,
}

impl PagedCursor {
    /// Wrap `cursor`, probing its paging capabilities.
    pub fn open(mut cursor: Box<dyn SourceCursor>, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(TransferError::Config(
                "page size must be at least 1".to_string(),
            ));
        }

        let mode = match cursor.set_fetch_size(page_size) {
            Ok(()) => PagingMode::Native,
            Err(e) => {
                debug!("Driver rejected fetch size {}: {}", page_size, e);
                match cursor.fetch_n_encoding() {
                    Some(encoding) => PagingMode::FetchN(encoding),
                    None => {
                        warn!(
                            "Source driver supports neither a fetch size nor fetch-N; \
                             rows will be fetched one at a time and performance may be poor"
                        );
                        PagingMode::Unpaged
                    }
                }
            }
        };
        debug!("Source cursor paging mode: {} (page size {})", mode, page_size);

        Ok(Self {
            cursor,
            mode,
            page_size,
            page: VecDeque::new(),
            current: None,
            exhausted: false,
        })
    }

    /// Column metadata of the underlying cursor.
    pub fn columns(&self) -> &[SourceColumn] {
        self.cursor.columns()
    }

    /// Mode selected by the capability check. For logging only.
    pub fn mode(&self) -> PagingMode {
        self.mode
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Change the page size for subsequent pages.
    pub fn set_page_size(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(TransferError::Config(
                "page size must be at least 1".to_string(),
            ));
        }
        if self.mode == PagingMode::Native {
            self.cursor.set_fetch_size(n)?;
        }
        self.page_size = n;
        Ok(())
    }

    /// Move to the next row. Returns `false` once the result is exhausted;
    /// further calls keep returning `false` without touching the driver.
    pub async fn advance(&mut self) -> Result<bool> {
        if self.exhausted {
            self.current = None;
            return Ok(false);
        }

        let next = match self.mode {
            PagingMode::Native | PagingMode::Unpaged => self.cursor.fetch_row().await?,
            PagingMode::FetchN(encoding) => self.next_from_page(encoding).await?,
        };

        match next {
            Some(row) => {
                self.current = Some(row);
                Ok(true)
            }
            None => {
                self.exhausted = true;
                self.current = None;
                Ok(false)
            }
        }
    }

    /// The row the last successful [`advance`](Self::advance) moved to.
    pub fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    /// Take ownership of the current row.
    pub fn take_row(&mut self) -> Option<Row> {
        self.current.take()
    }

    async fn next_from_page(&mut self, encoding: RowEncoding) -> Result<Option<Row>> {
        if self.page.is_empty() {
            let payloads = self.cursor.fetch_n(self.page_size).await?;
            debug!("Fetched page of {} rows", payloads.len());
            self.page = payloads.into();
        }

        match self.page.pop_front() {
            None => Ok(None),
            Some(payload) if payload.is_empty() => {
                self.page.clear();
                Ok(None)
            }
            Some(payload) => decode_row(encoding, &payload, self.cursor.columns()).map(Some),
        }
    }
}

impl fmt::Debug for PagedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedCursor")
            .field("mode", &self.mode)
            .field("page_size", &self.page_size)
            .field("buffered", &self.page.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
