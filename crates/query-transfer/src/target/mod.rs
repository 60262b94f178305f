//! Target side: batch accumulation and connectors.

pub mod memory;
pub mod odbc;

pub use memory::{MemoryTarget, MemoryTargetLog};
pub use odbc::OdbcTarget;

use crate::core::value::{Row, SqlValue};
use crate::error::{Result, TransferError};

/// Rows bound for the prepared insert but not yet executed.
///
/// Parameters of the pending row are set positionally (1-based) and the row
/// is appended with [`add`](BatchBuffer::add). Every parameter must be bound
/// before the row is added.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    pending: Vec<Option<SqlValue>>,
    rows: Vec<Row>,
}

impl BatchBuffer {
    pub fn new(column_count: usize) -> Self {
        Self {
            pending: vec![None; column_count],
            rows: Vec::new(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.pending.len()
    }

    pub fn bind(&mut self, position: usize, value: SqlValue) -> Result<()> {
        let count = self.pending.len();
        let slot = position
            .checked_sub(1)
            .and_then(|i| self.pending.get_mut(i))
            .ok_or_else(|| {
                TransferError::target_error(
                    format!(
                        "Parameter position {} out of range (statement has {} parameters)",
                        position, count
                    ),
                    None,
                )
            })?;
        *slot = Some(value);
        Ok(())
    }

    pub fn add(&mut self) -> Result<()> {
        if let Some(i) = self.pending.iter().position(Option::is_none) {
            return Err(TransferError::target_error(
                format!("Parameter {} was not bound", i + 1),
                None,
            ));
        }
        let row = self
            .pending
            .iter_mut()
            .map(|slot| slot.take().unwrap_or(SqlValue::Null))
            .collect();
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Remove and return the accumulated rows.
    pub fn take(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    /// Discard accumulated rows and any partially bound row.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.pending.iter_mut().for_each(|slot| *slot = None);
    }
}

/// Build the parameterized insert statement for the target columns.
///
/// `INSERT INTO [schema.]table (c1,c2,...) VALUES (?,?,...)`
pub fn build_insert_sql(qualified_table: &str, column_names: &[&str]) -> String {
    let placeholders = vec!["?"; column_names.len()].join(",");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table,
        column_names.join(","),
        placeholders
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_add_in_position_order() {
        let mut buffer = BatchBuffer::new(2);
        buffer.bind(2, SqlValue::from("b")).unwrap();
        buffer.bind(1, SqlValue::I64(1)).unwrap();
        buffer.add().unwrap();
        assert_eq!(buffer.len(), 1);
        assert_eq!(
            buffer.take(),
            vec![vec![SqlValue::I64(1), SqlValue::from("b")]]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_bind_out_of_range() {
        let mut buffer = BatchBuffer::new(1);
        assert!(buffer.bind(0, SqlValue::Null).is_err());
        assert!(buffer.bind(2, SqlValue::Null).is_err());
    }

    #[test]
    fn test_add_requires_all_params() {
        let mut buffer = BatchBuffer::new(2);
        buffer.bind(1, SqlValue::I64(1)).unwrap();
        let err = buffer.add().unwrap_err();
        assert!(err.to_string().contains("Parameter 2"));
    }

    #[test]
    fn test_clear_discards_partial_row() {
        let mut buffer = BatchBuffer::new(1);
        buffer.bind(1, SqlValue::I64(1)).unwrap();
        buffer.add().unwrap();
        buffer.bind(1, SqlValue::I64(2)).unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.add().is_err());
    }

    #[test]
    fn test_insert_sql() {
        assert_eq!(
            build_insert_sql("ANALYTICS.T1", &["c0", "name"]),
            "INSERT INTO ANALYTICS.T1 (c0,name) VALUES (?,?)"
        );
        assert_eq!(build_insert_sql("T1", &["x"]), "INSERT INTO T1 (x) VALUES (?)");
    }
}
