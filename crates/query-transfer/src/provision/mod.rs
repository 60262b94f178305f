//! Target table creation with a pluggable retry policy.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::TransferOptions;
use crate::core::identifier::validate_identifier;
use crate::core::schema::ColumnDescriptor;
use crate::core::traits::{RetryDecision, RetryPolicy, TargetConnection};
use crate::error::{Result, TransferError};

/// Render the CREATE TABLE statement for the descriptors.
///
/// `CREATE TABLE [schema.]table (c1 T1, c2 T2, ...)[ TABLESPACE ts]`
pub fn build_create_table_sql(
    descriptors: &[ColumnDescriptor],
    options: &TransferOptions,
) -> Result<String> {
    if descriptors.is_empty() {
        return Err(TransferError::Config(
            "query result has no columns to create a table from".to_string(),
        ));
    }
    for descriptor in descriptors {
        validate_identifier(&descriptor.name)?;
    }

    let columns = descriptors
        .iter()
        .map(ColumnDescriptor::definition)
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("CREATE TABLE {} ({})", options.qualified_table(), columns);
    if let Some(tablespace) = options.target_tablespace() {
        sql.push_str(" TABLESPACE ");
        sql.push_str(tablespace);
    }
    Ok(sql)
}

/// Create the target table, consulting `policy` after every failure.
///
/// The same statement is re-issued on `Retry`. On `Abort` the last error is
/// reported as `ProvisionFailure`. Returns the executed DDL.
pub async fn create_table_with_retry(
    target: &mut dyn TargetConnection,
    descriptors: &[ColumnDescriptor],
    options: &TransferOptions,
    policy: &mut dyn RetryPolicy,
) -> Result<String> {
    let sql = build_create_table_sql(descriptors, options)?;
    let table = options.qualified_table();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        info!("Executing SQL: {}", sql);

        match target.execute_ddl(&sql).await {
            Ok(()) => {
                info!("Created target table {}", table);
                return Ok(sql);
            }
            Err(e) => {
                error!(
                    "Unable to create table {} to store the query results (attempt {}): {}",
                    table, attempt, e
                );
                match policy.decide(attempt, &e).await {
                    RetryDecision::Retry => {
                        warn!("Retrying creation of table {}", table);
                    }
                    RetryDecision::Abort => {
                        return Err(TransferError::ProvisionFailure {
                            table,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Policy that never retries. The library default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

#[async_trait]
impl RetryPolicy for NeverRetry {
    async fn decide(&mut self, _attempt: u32, _error: &TransferError) -> RetryDecision {
        RetryDecision::Abort
    }
}

/// Policy that replays a fixed sequence of decisions, then aborts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRetry {
    decisions: VecDeque<RetryDecision>,
    consulted: u32,
}

impl ScriptedRetry {
    pub fn new(decisions: impl IntoIterator<Item = RetryDecision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            consulted: 0,
        }
    }

    /// How many times the policy was asked.
    pub fn consulted(&self) -> u32 {
        self.consulted
    }
}

#[async_trait]
impl RetryPolicy for ScriptedRetry {
    async fn decide(&mut self, _attempt: u32, _error: &TransferError) -> RetryDecision {
        self.consulted += 1;
        self.decisions.pop_front().unwrap_or(RetryDecision::Abort)
    }
}
