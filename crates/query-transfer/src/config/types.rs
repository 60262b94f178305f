//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::identifier::qualify_table;
use crate::error::{Result, TransferError};

/// Default ODBC connection string for the source: a local HiveServer.
pub const DEFAULT_SOURCE_CONNECTION_STRING: &str =
    "Driver={Cloudera ODBC Driver for Apache Hive};Host=localhost;Port=10000;Schema=default";

/// Default rows per insert batch.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;

/// Default insert batches per commit.
pub const DEFAULT_COMMIT_BATCH_COUNT: usize = 20;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source (Hive) connection.
    #[serde(default)]
    pub source: SourceConfig,

    /// Target (Oracle) connection and table.
    #[serde(default)]
    pub target: TargetConfig,

    /// Query and batching behavior.
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Source connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// ODBC connection string, without credentials.
    #[serde(default = "default_source_connection_string")]
    pub connection_string: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password. Prompted for when absent.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            connection_string: default_source_connection_string(),
            user: String::new(),
            password: None,
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("connection_string", &self.connection_string)
            .field("user", &self.user)
            .field("password", &redacted(&self.password))
            .finish()
    }
}

/// Target connection and table configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// ODBC connection string, without credentials.
    #[serde(default)]
    pub connection_string: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password. Prompted for when absent.
    #[serde(default)]
    pub password: Option<String>,

    /// Schema to create the table in (default: the user's schema).
    #[serde(default)]
    pub schema: Option<String>,

    /// Name of the table to create.
    #[serde(default)]
    pub table: String,

    /// Tablespace to create the table in.
    #[serde(default)]
    pub tablespace: Option<String>,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("connection_string", &self.connection_string)
            .field("user", &self.user)
            .field("password", &redacted(&self.password))
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("tablespace", &self.tablespace)
            .finish()
    }
}

/// Query and batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Query to run against the source.
    #[serde(default)]
    pub query: Option<String>,

    /// File containing the query. Read only when `query` is unset.
    #[serde(default)]
    pub query_file: Option<PathBuf>,

    /// Rows per insert batch (default: 500).
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,

    /// Insert batches per commit (default: 20).
    #[serde(default = "default_commit_batch_count")]
    pub commit_batch_count: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            query: None,
            query_file: None,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            commit_batch_count: DEFAULT_COMMIT_BATCH_COUNT,
        }
    }
}

/// Resolved credentials and address of one database.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub connection_string: String,
    pub user: String,
    pub password: Option<String>,
}

impl ConnectionSettings {
    /// Full ODBC connection string including credentials.
    ///
    /// Credentials are brace-quoted so `;`, `=` and `}` in them cannot
    /// end the attribute.
    pub fn odbc_connection_string(&self) -> String {
        let mut s = self.connection_string.trim_end_matches(';').to_string();
        if !self.user.is_empty() {
            s.push_str(&format!(";UID={}", quote_attribute(&self.user)));
        }
        if let Some(password) = &self.password {
            s.push_str(&format!(";PWD={}", quote_attribute(password)));
        }
        s.push(';');
        s
    }

    /// Human-readable description without credentials, for logs and prompts.
    pub fn describe(&self) -> String {
        format!("{} as user \"{}\"", self.connection_string, self.user)
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("connection_string", &self.connection_string)
            .field("user", &self.user)
            .field("password", &redacted(&self.password))
            .finish()
    }
}

/// Validated options the transfer engine runs with.
///
/// Batch size and commit count are at least 1; [`TransferOptions::new`]
/// rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOptions {
    target_schema: Option<String>,
    target_table: String,
    target_tablespace: Option<String>,
    insert_batch_size: usize,
    commit_batch_count: usize,
    query: String,
}

impl TransferOptions {
    pub fn new(
        target_table: impl Into<String>,
        query: impl Into<String>,
        insert_batch_size: usize,
        commit_batch_count: usize,
    ) -> Result<Self> {
        let target_table = target_table.into();
        let query = query.into();

        if target_table.trim().is_empty() {
            return Err(TransferError::Config("target table is required".into()));
        }
        if query.trim().is_empty() {
            return Err(TransferError::Config("query is required".into()));
        }
        if insert_batch_size == 0 {
            return Err(TransferError::Config(
                "insert_batch_size must be at least 1".into(),
            ));
        }
        if commit_batch_count == 0 {
            return Err(TransferError::Config(
                "commit_batch_count must be at least 1".into(),
            ));
        }

        Ok(Self {
            target_schema: None,
            target_table,
            target_tablespace: None,
            insert_batch_size,
            commit_batch_count,
            query,
        })
    }

    pub fn with_target_schema(mut self, schema: impl Into<String>) -> Self {
        self.target_schema = non_empty(schema.into());
        self
    }

    pub fn with_target_tablespace(mut self, tablespace: impl Into<String>) -> Self {
        self.target_tablespace = non_empty(tablespace.into());
        self
    }

    pub fn target_schema(&self) -> Option<&str> {
        self.target_schema.as_deref()
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn target_tablespace(&self) -> Option<&str> {
        self.target_tablespace.as_deref()
    }

    pub fn insert_batch_size(&self) -> usize {
        self.insert_batch_size
    }

    pub fn commit_batch_count(&self) -> usize {
        self.commit_batch_count
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// `[schema.]table` as written into generated statements.
    pub fn qualified_table(&self) -> String {
        qualify_table(self.target_schema(), &self.target_table)
    }
}

/// `{value}` with every `}` doubled.
fn quote_attribute(value: &str) -> String {
    format!("{{{}}}", value.replace('}', "}}"))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn redacted(password: &Option<String>) -> &'static str {
    match password {
        Some(_) => "[REDACTED]",
        None => "<unset>",
    }
}

fn default_source_connection_string() -> String {
    DEFAULT_SOURCE_CONNECTION_STRING.to_string()
}

fn default_insert_batch_size() -> usize {
    DEFAULT_INSERT_BATCH_SIZE
}

fn default_commit_batch_count() -> usize {
    DEFAULT_COMMIT_BATCH_COUNT
}
