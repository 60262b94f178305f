//! ODBC source connection (Hive).
//!
//! The ODBC environment, connection and cursor all borrow from each other,
//! so they live together on a dedicated worker thread. The async side sends
//! commands over a channel and awaits the reply; only one request is ever
//! outstanding, which also serializes driver access.
//!
//! The cursor speaks the legacy fetch-N protocol: each request binds a text
//! row set of the requested size and returns its rows as list-encoded
//! payloads. A driver-side fetch size is not supported.

use std::sync::mpsc;
use std::thread;

use async_trait::async_trait;
use odbc_api::buffers::TextRowSet;
use odbc_api::handles::StatementImpl;
use odbc_api::{
    BlockCursor, ConnectionOptions, Cursor, CursorImpl, DataType, Environment, ResultSetMetadata,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::config::ConnectionSettings;
use crate::core::schema::SourceColumn;
use crate::core::traits::{SourceConnection, SourceCursor};
use crate::core::value::Row;
use crate::error::{odbc_native_code, Result, TransferError};
use crate::typemap::SourceType;

use super::codec::{decode_row, RowEncoding};

/// Maximum bytes fetched per text cell. Longer values fail the fetch.
const MAX_TEXT_LEN: usize = 65536;

enum Command {
    Execute {
        sql: String,
        reply: oneshot::Sender<Result<Vec<SourceColumn>>>,
    },
    FetchN {
        n: usize,
        reply: oneshot::Sender<Result<Vec<String>>>,
    },
}

/// Map an ODBC column type onto the source wire type.
///
/// Hive reports its STRING type as one of the character types depending on
/// driver version, so all of them are treated as varchar.
pub fn source_type_from_odbc(data_type: &DataType) -> SourceType {
    match data_type {
        DataType::Bit => SourceType::Boolean,
        DataType::TinyInt => SourceType::TinyInt,
        DataType::SmallInt => SourceType::SmallInt,
        DataType::Integer => SourceType::Integer,
        DataType::BigInt => SourceType::BigInt,
        DataType::Float { .. } => SourceType::Float,
        DataType::Real => SourceType::Real,
        DataType::Double => SourceType::Double,
        DataType::Decimal { .. } => SourceType::Decimal,
        DataType::Numeric { .. } => SourceType::Numeric,
        DataType::Char { .. }
        | DataType::WChar { .. }
        | DataType::Varchar { .. }
        | DataType::WVarchar { .. }
        | DataType::LongVarchar { .. } => SourceType::Varchar,
        other => SourceType::Other(i32::from(other.data_type().0)),
    }
}

fn source_err(context: &str, err: odbc_api::Error) -> TransferError {
    TransferError::Source {
        message: format!("{}: {}", context, err),
        code: odbc_native_code(&err),
    }
}

fn fetch_err(err: odbc_api::Error) -> TransferError {
    match err {
        odbc_api::Error::TooLargeValueForBuffer {
            indicator,
            buffer_index,
        } => TransferError::source_error(format!(
            "Value in source column {} is {} bytes, larger than the {} byte fetch buffer",
            buffer_index + 1,
            indicator.map_or_else(|| "of unknown length but".to_string(), |n| n.to_string()),
            MAX_TEXT_LEN
        )),
        other => source_err("Failed to fetch rows", other),
    }
}

/// ODBC-backed source connection.
pub struct OdbcSource {
    commands: mpsc::Sender<Command>,
    description: String,
}

impl OdbcSource {
    /// Connect on a new worker thread.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let connection_string = settings.odbc_connection_string();
        let description = settings.describe();
        let (commands, receiver) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        thread::Builder::new()
            .name("odbc-source".to_string())
            .spawn(move || worker(connection_string, ready_tx, receiver))?;

        ready_rx.await.map_err(|_| {
            TransferError::connection("ODBC worker exited during connect", "source connection")
        })??;

        info!("Connected to source: {}", description);
        Ok(Self {
            commands,
            description,
        })
    }
}

#[async_trait]
impl SourceConnection for OdbcSource {
    async fn execute_query(&mut self, sql: &str) -> Result<Box<dyn SourceCursor>> {
        debug!("Executing source query on {}", self.description);
        let (reply, rx) = oneshot::channel();
        send(
            &self.commands,
            Command::Execute {
                sql: sql.to_string(),
                reply,
            },
        )?;
        let columns = receive(rx).await?;

        Ok(Box::new(OdbcCursor {
            commands: self.commands.clone(),
            columns,
        }))
    }

    fn db_type(&self) -> &str {
        "hive"
    }
}

struct OdbcCursor {
    commands: mpsc::Sender<Command>,
    columns: Vec<SourceColumn>,
}

#[async_trait]
impl SourceCursor for OdbcCursor {
    fn columns(&self) -> &[SourceColumn] {
        &self.columns
    }

    fn set_fetch_size(&mut self, _n: usize) -> Result<()> {
        Err(TransferError::source_error(
            "driver-side fetch size is not supported by the ODBC source",
        ))
    }

    async fn fetch_row(&mut self) -> Result<Option<Row>> {
        let mut page = self.fetch_n(1).await?;
        match page.pop() {
            Some(payload) if !payload.is_empty() => {
                decode_row(RowEncoding::List, &payload, &self.columns).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn fetch_n_encoding(&self) -> Option<RowEncoding> {
        Some(RowEncoding::List)
    }

    async fn fetch_n(&mut self, n: usize) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        send(&self.commands, Command::FetchN { n, reply })?;
        receive(rx).await
    }
}

fn send(commands: &mpsc::Sender<Command>, command: Command) -> Result<()> {
    commands.send(command).map_err(|_| {
        TransferError::connection("ODBC worker thread has stopped", "source connection")
    })
}

async fn receive<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
    rx.await.map_err(|_| {
        TransferError::connection("ODBC worker dropped the request", "source connection")
    })?
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
                "source connection",
            )));
            return;
        }
    };
    let conn = match env
        .connect_with_connection_string(&connection_string, ConnectionOptions::default())
    {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(TransferError::connection(
                format!("Unable to connect to source: {}", e),
                "source connection",
            )));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    let mut block: Option<BlockCursor<CursorImpl<StatementImpl<'_>>, TextRowSet>> = None;
    let mut capacity = 0;

    while let Ok(command) = commands.recv() {
        match command {
            Command::Execute { sql, reply } => {
                block = None;
                let result = conn
                    .execute(&sql, ())
                    .map_err(|e| source_err("Source query failed", e))
                    .and_then(|cursor| {
                        cursor.ok_or_else(|| {
                            TransferError::source_error("Source query returned no result set")
                        })
                    })
                    .and_then(|mut cursor| {
                        let columns = describe_columns(&mut cursor)?;
                        capacity = 1;
                        let buffer = TextRowSet::for_cursor(capacity, &mut cursor, Some(MAX_TEXT_LEN))
                            .map_err(|e| source_err("Failed to allocate row buffer", e))?;
                        let bound = cursor
                            .bind_buffer(buffer)
                            .map_err(|e| source_err("Failed to bind row buffer", e))?;
                        block = Some(bound);
                        Ok(columns)
                    });
                let _ = reply.send(result);
            }
            Command::FetchN { n, reply } => {
                let result = match block.take() {
                    None => Err(TransferError::source_error("No open source cursor")),
                    Some(mut bound) => {
                        if n != capacity {
                            match rebind(bound, n) {
                                Ok(rebound) => {
                                    capacity = n;
                                    bound = rebound;
                                }
                                Err(e) => {
                                    let _ = reply.send(Err(e));
                                    continue;
                                }
                            }
                        }
                        let page = fetch_page(&mut bound);
                        block = Some(bound);
                        page
                    }
                };
                let _ = reply.send(result);
            }
        }
    }
    debug!("ODBC source worker exiting");
}

fn describe_columns(cursor: &mut impl ResultSetMetadata) -> Result<Vec<SourceColumn>> {
    let count = cursor
        .num_result_cols()
        .map_err(|e| source_err("Failed to read column count", e))?;

    (1..=count as u16)
        .map(|i| {
            let name = cursor
                .col_name(i)
                .map_err(|e| source_err("Failed to read column name", e))?;
            let data_type = cursor
                .col_data_type(i)
                .map_err(|e| source_err("Failed to read column type", e))?;
            Ok(SourceColumn::new(name, source_type_from_odbc(&data_type)))
        })
        .collect()
}

fn rebind<C: Cursor>(
    bound: BlockCursor<C, TextRowSet>,
    n: usize,
) -> Result<BlockCursor<C, TextRowSet>> {
    let (mut cursor, _old) = bound
        .unbind()
        .map_err(|e| source_err("Failed to unbind row buffer", e))?;
    let buffer = TextRowSet::for_cursor(n, &mut cursor, Some(MAX_TEXT_LEN))
        .map_err(|e| source_err("Failed to allocate row buffer", e))?;
    cursor
        .bind_buffer(buffer)
        .map_err(|e| source_err("Failed to bind row buffer", e))
}

/// Fetch one block and serialize its rows as list payloads.
///
/// A cell longer than the buffer is an error, never a shortened value.
fn fetch_page<C: Cursor>(bound: &mut BlockCursor<C, TextRowSet>) -> Result<Vec<String>> {
    let batch = match bound.fetch_with_truncation_check(true).map_err(fetch_err)? {
        Some(batch) => batch,
        None => return Ok(Vec::new()),
    };

    let mut page = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let values: Vec<Value> = (0..batch.num_cols())
            .map(|col| match batch.at(col, row) {
                Some(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
                None => Value::Null,
            })
            .collect();
        page.push(Value::Array(values).to_string());
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hive_types_map_to_source_types() {
        assert_eq!(source_type_from_odbc(&DataType::Bit), SourceType::Boolean);
        assert_eq!(source_type_from_odbc(&DataType::BigInt), SourceType::BigInt);
        assert_eq!(source_type_from_odbc(&DataType::Double), SourceType::Double);
        assert_eq!(
            source_type_from_odbc(&DataType::Decimal {
                precision: 10,
                scale: 2
            }),
            SourceType::Decimal
        );
    }

    #[test]
    fn test_unmapped_odbc_type_keeps_code() {
        // SQL_TYPE_DATE
        assert_eq!(source_type_from_odbc(&DataType::Date), SourceType::Other(91));
    }

    #[test]
    fn test_oversized_value_is_source_error() {
        let err = fetch_err(odbc_api::Error::TooLargeValueForBuffer {
            indicator: Some(70_000),
            buffer_index: 2,
        });
        match err {
            TransferError::Source { message, code } => {
                assert!(message.contains("source column 3"));
                assert!(message.contains("70000 bytes"));
                assert!(code.is_none());
            }
            other => panic!("expected Source error, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_value_of_unknown_length() {
        let err = fetch_err(odbc_api::Error::TooLargeValueForBuffer {
            indicator: None,
            buffer_index: 0,
        });
        assert!(err.to_string().contains("unknown length"));
    }

    #[test]
    fn test_long_character_types_map_to_varchar() {
        assert_eq!(
            source_type_from_odbc(&DataType::LongVarchar { length: None }),
            SourceType::Varchar
        );
    }
}
