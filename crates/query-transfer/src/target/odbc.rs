//! ODBC target connection (Oracle).
//!
//! Like the source connector, all ODBC handles live on a dedicated worker
//! thread and are driven through a command channel. Autocommit is switched
//! off at connect time so the transaction boundary is exactly the loader's
//! commit cadence.
//!
//! Rows are accumulated in a [`BatchBuffer`] on the async side and shipped
//! to the worker as one command per batch. The worker binds the batch as
//! text parameter arrays and executes the prepared statement once. Driver
//! diagnostics keep their native error code so a killed session
//! (`ORA-00028`) is recognised.

use std::sync::mpsc;
use std::thread;

use async_trait::async_trait;
use odbc_api::buffers::BufferDesc;
use odbc_api::handles::StatementImpl;
use odbc_api::{ConnectionOptions, Environment, Prepared};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::config::ConnectionSettings;
use crate::core::traits::TargetConnection;
use crate::core::value::{Row, SqlValue};
use crate::error::{odbc_native_code, Result, TransferError};

use super::BatchBuffer;

enum Command {
    Execute {
        sql: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Prepare {
        sql: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Insert {
        rows: Vec<Vec<Option<String>>>,
        reply: oneshot::Sender<Result<u64>>,
    },
    Commit {
        reply: oneshot::Sender<Result<()>>,
    },
    Rollback {
        reply: oneshot::Sender<Result<()>>,
    },
}

fn target_err(context: &str, err: odbc_api::Error) -> TransferError {
    TransferError::Target {
        message: format!("{}: {}", context, err),
        code: odbc_native_code(&err),
    }
}

/// ODBC-backed target connection.
pub struct OdbcTarget {
    commands: mpsc::Sender<Command>,
    buffer: BatchBuffer,
    description: String,
}

impl OdbcTarget {
    /// Connect on a new worker thread and disable autocommit.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let connection_string = settings.odbc_connection_string();
        let description = settings.describe();
        let (commands, receiver) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        thread::Builder::new()
            .name("odbc-target".to_string())
            .spawn(move || worker(connection_string, ready_tx, receiver))?;

        ready_rx.await.map_err(|_| {
            TransferError::connection("ODBC worker exited during connect", "target connection")
        })??;

        info!("Connected to target: {}", description);
        Ok(Self {
            commands,
            buffer: BatchBuffer::default(),
            description,
        })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(make(reply)).map_err(|_| {
            TransferError::connection("ODBC worker thread has stopped", "target connection")
        })?;
        rx.await.map_err(|_| {
            TransferError::connection("ODBC worker dropped the request", "target connection")
        })?
    }
}

/// Escape a string literal for inclusion in a PL/SQL block.
fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

#[async_trait]
impl TargetConnection for OdbcTarget {
    async fn initialize_session(&mut self, module: &str, action: &str) -> Result<()> {
        let sql = format!(
            "BEGIN DBMS_APPLICATION_INFO.SET_MODULE(module_name => '{}', action_name => '{}'); END;",
            escape_literal(module),
            escape_literal(action)
        );
        debug!("Initializing session on {}", self.description);
        self.request(|reply| Command::Execute { sql, reply }).await
    }

    async fn execute_ddl(&mut self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.request(|reply| Command::Execute { sql, reply }).await
    }

    async fn prepare_insert(&mut self, sql: &str, column_count: usize) -> Result<()> {
        self.buffer = BatchBuffer::new(column_count);
        let sql = sql.to_string();
        self.request(|reply| Command::Prepare { sql, reply }).await
    }

    fn bind_param(&mut self, position: usize, value: SqlValue) -> Result<()> {
        self.buffer.bind(position, value)
    }

    fn add_batch(&mut self) -> Result<()> {
        self.buffer.add()
    }

    async fn execute_batch(&mut self) -> Result<u64> {
        let rows = self.buffer.take().iter().map(row_to_text).collect();
        self.request(|reply| Command::Insert { rows, reply }).await
    }

    fn clear_batch(&mut self) {
        self.buffer.clear();
    }

    async fn commit(&mut self) -> Result<()> {
        self.request(|reply| Command::Commit { reply }).await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.request(|reply| Command::Rollback { reply }).await
    }

    fn db_type(&self) -> &str {
        "oracle"
    }
}

fn row_to_text(row: &Row) -> Vec<Option<String>> {
    row.iter().map(SqlValue::to_param_text).collect()
}

/// Body of the worker thread. Owns every ODBC handle.
fn worker(
    connection_string: String,
    ready: oneshot::Sender<Result<()>>,
    commands: mpsc::Receiver<Command>,
) {
    let env = match Environment::new() {
        Ok(env) => env,
        Err(e) => {
            let _ = ready.send(Err(TransferError::connection(
                format!("Failed to create ODBC environment: {}", e),
                "target connection",
            )));
            return;
        }
    };
    let conn = match env
        .connect_with_connection_string(&connection_string, ConnectionOptions::default())
        .and_then(|conn| conn.set_autocommit(false).map(|()| conn))
    {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(TransferError::connection(
                format!("Unable to connect to target: {}", e),
                "target connection",
            )));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    let mut prepared: Option<Prepared<StatementImpl<'_>>> = None;

    while let Ok(command) = commands.recv() {
        match command {
            Command::Execute { sql, reply } => {
                let result = conn
                    .execute(&sql, ())
                    .map(|_| ())
                    .map_err(|e| target_err("Statement failed", e));
                let _ = reply.send(result);
            }
            Command::Prepare { sql, reply } => {
                prepared = None;
                let result = conn
                    .prepare(&sql)
                    .map(|statement| prepared = Some(statement))
                    .map_err(|e| target_err("Failed to prepare insert", e));
                let _ = reply.send(result);
            }
            Command::Insert { rows, reply } => {
                let result = match prepared.as_mut() {
                    Some(statement) => insert_rows(statement, &rows),
                    None => Err(TransferError::target_error(
                        "Insert executed before prepare",
                        None,
                    )),
                };
                let _ = reply.send(result);
            }
            Command::Commit { reply } => {
                let _ = reply.send(conn.commit().map_err(|e| target_err("Commit failed", e)));
            }
            Command::Rollback { reply } => {
                let _ = reply.send(conn.rollback().map_err(|e| target_err("Rollback failed", e)));
            }
        }
    }
    debug!("ODBC target worker exiting");
}

/// Widest value of each column in bytes, at least 1.
fn text_column_widths(rows: &[Vec<Option<String>>]) -> Vec<usize> {
    let column_count = rows.first().map_or(0, Vec::len);
    (0..column_count)
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col).and_then(|v| v.as_deref()))
                .map(str::len)
                .max()
                .unwrap_or(0)
                .max(1)
        })
        .collect()
}

/// Bind `rows` as parameter arrays and execute the statement once.
fn insert_rows(
    statement: &mut Prepared<StatementImpl<'_>>,
    rows: &[Vec<Option<String>>],
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let widths = text_column_widths(rows);
    let descriptions = widths
        .iter()
        .map(|&max_str_len| BufferDesc::Text { max_str_len });
    let mut inserter = statement
        .column_inserter(rows.len(), descriptions)
        .map_err(|e| target_err("Failed to bind insert parameters", e))?;
    inserter.set_num_rows(rows.len());

    for col in 0..widths.len() {
        let mut column = inserter.column_mut(col).as_text_view().ok_or_else(|| {
            TransferError::target_error("Insert parameter buffer is not text", None)
        })?;
        for (index, row) in rows.iter().enumerate() {
            let cell = row.get(col).and_then(|v| v.as_deref()).map(str::as_bytes);
            column.set_cell(index, cell);
        }
    }

    inserter
        .execute()
        .map(|_| ())
        .map_err(|e| target_err("Insert failed", e))?;
    Ok(rows.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("query-transfer"), "query-transfer");
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
    }

    #[test]
    fn test_row_to_text() {
        let row = vec![SqlValue::Null, SqlValue::Bool(true), SqlValue::from("x")];
        assert_eq!(
            row_to_text(&row),
            vec![None, Some("1".to_string()), Some("x".to_string())]
        );
    }

    #[test]
    fn test_text_column_widths_cover_every_value() {
        let rows = vec![
            vec![Some("east".to_string()), None, Some("1".to_string())],
            vec![Some("north-west".to_string()), None, Some("12345".to_string())],
        ];
        assert_eq!(text_column_widths(&rows), vec![10, 1, 5]);
    }

    #[test]
    fn test_text_column_widths_counts_bytes() {
        let rows = vec![vec![Some("Zürich".to_string())]];
        assert_eq!(text_column_widths(&rows), vec![7]);
        assert!(text_column_widths(&[]).is_empty());
    }
}
