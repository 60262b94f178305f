//! In-process target connection.
//!
//! Records every call in a shared [`MemoryTargetLog`] and applies
//! transaction semantics: executed rows stay pending until commit and are
//! discarded on rollback. Failures can be injected per operation.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::core::traits::TargetConnection;
use crate::core::value::{Row, SqlValue};
use crate::error::{Result, TransferError, SESSION_KILLED_CODE};

use super::BatchBuffer;

#[derive(Debug, Default)]
struct LogState {
    session_labels: Vec<(String, String)>,
    ddl_attempts: usize,
    created_tables: Vec<String>,
    prepared: Option<String>,
    batch_sizes: Vec<usize>,
    uncommitted: Vec<Row>,
    committed: Vec<Row>,
    commits: usize,
    rollbacks: usize,
}

/// Shared view of everything a [`MemoryTarget`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct MemoryTargetLog {
    state: Arc<Mutex<LogState>>,
}

impl MemoryTargetLog {
    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `(module, action)` pairs passed to session initialization.
    pub fn session_labels(&self) -> Vec<(String, String)> {
        self.lock().session_labels.clone()
    }

    /// Number of DDL statements attempted, successful or not.
    pub fn ddl_attempts(&self) -> usize {
        self.lock().ddl_attempts
    }

    /// DDL statements that succeeded.
    pub fn created_tables(&self) -> Vec<String> {
        self.lock().created_tables.clone()
    }

    pub fn prepared_insert(&self) -> Option<String> {
        self.lock().prepared.clone()
    }

    /// Row count of every successfully executed batch, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    /// Rows made durable by a commit, in insertion order.
    pub fn committed_rows(&self) -> Vec<Row> {
        self.lock().committed.clone()
    }

    /// Rows executed since the last commit or rollback.
    pub fn uncommitted_rows(&self) -> Vec<Row> {
        self.lock().uncommitted.clone()
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }
}

/// Target connection that keeps inserted rows in memory.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    log: MemoryTargetLog,
    buffer: BatchBuffer,
    ddl_failures_left: usize,
    fail_batch: Option<(usize, Option<i32>)>,
    fail_commit: Option<(usize, Option<i32>)>,
    fail_rollback: bool,
    fail_session_init: bool,
    batch_calls: usize,
    commit_calls: usize,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the first `n` DDL statements fail with "name already used".
    pub fn fail_ddl_times(mut self, n: usize) -> Self {
        self.ddl_failures_left = n;
        self
    }

    /// Make the `n`-th (1-based) batch execution fail with native `code`.
    pub fn fail_batch(mut self, n: usize, code: Option<i32>) -> Self {
        self.fail_batch = Some((n, code));
        self
    }

    /// Make the `n`-th (1-based) commit fail with native `code`.
    pub fn fail_commit(mut self, n: usize, code: Option<i32>) -> Self {
        self.fail_commit = Some((n, code));
        self
    }

    pub fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub fn fail_session_init(mut self) -> Self {
        self.fail_session_init = true;
        self
    }

    /// Handle on the call log; stays valid after the target is moved.
    pub fn log(&self) -> MemoryTargetLog {
        self.log.clone()
    }
}

fn injected(code: Option<i32>) -> TransferError {
    let message = match code {
        Some(SESSION_KILLED_CODE) => "ORA-00028: your session has been killed".to_string(),
        Some(code) => format!("ORA-{:05}: injected failure", code),
        None => "injected failure".to_string(),
    };
    TransferError::target_error(message, code)
}

#[async_trait]
impl TargetConnection for MemoryTarget {
    async fn initialize_session(&mut self, module: &str, action: &str) -> Result<()> {
        if self.fail_session_init {
            return Err(injected(Some(6550)));
        }
        self.log
            .lock()
            .session_labels
            .push((module.to_string(), action.to_string()));
        Ok(())
    }

    async fn execute_ddl(&mut self, sql: &str) -> Result<()> {
        let mut state = self.log.lock();
        state.ddl_attempts += 1;
        if self.ddl_failures_left > 0 {
            self.ddl_failures_left -= 1;
            return Err(TransferError::target_error(
                "ORA-00955: name is already used by an existing object",
                Some(955),
            ));
        }
        state.created_tables.push(sql.to_string());
        Ok(())
    }

    async fn prepare_insert(&mut self, sql: &str, column_count: usize) -> Result<()> {
        self.buffer = BatchBuffer::new(column_count);
        self.log.lock().prepared = Some(sql.to_string());
        Ok(())
    }

    fn bind_param(&mut self, position: usize, value: SqlValue) -> Result<()> {
        self.buffer.bind(position, value)
    }

    fn add_batch(&mut self) -> Result<()> {
        self.buffer.add()
    }

    async fn execute_batch(&mut self) -> Result<u64> {
        self.batch_calls += 1;
        if let Some((n, code)) = self.fail_batch {
            if n == self.batch_calls {
                return Err(injected(code));
            }
        }

        let rows = self.buffer.take();
        let count = rows.len();
        debug!("memory target: executed batch of {} rows", count);
        let mut state = self.log.lock();
        state.batch_sizes.push(count);
        state.uncommitted.extend(rows);
        Ok(count as u64)
    }

    fn clear_batch(&mut self) {
        self.buffer.clear();
    }

    async fn commit(&mut self) -> Result<()> {
        self.commit_calls += 1;
        if let Some((n, code)) = self.fail_commit {
            if n == self.commit_calls {
                return Err(injected(code));
            }
        }

        let mut state = self.log.lock();
        let rows = std::mem::take(&mut state.uncommitted);
        state.committed.extend(rows);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.fail_rollback {
            return Err(injected(Some(SESSION_KILLED_CODE)));
        }
        let mut state = self.log.lock();
        state.uncommitted.clear();
        state.rollbacks += 1;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}
