//! Source side: cursor paging, row payload decoding and connectors.

pub mod codec;
pub mod memory;
pub mod odbc;
pub mod paged;

pub use codec::RowEncoding;
pub use memory::{MemoryPaging, MemorySource, MemorySourceStats};
pub use odbc::OdbcSource;
pub use paged::{PagedCursor, PagingMode};
