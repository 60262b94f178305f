//! Batch loader: drains a paged cursor into batched inserts with periodic
//! commits.
//!
//! The loader is a small state machine:
//!
//! ```text
//! Binding --(batch full)--> BatchFull --> Executing --(C batches)--> CommitDue
//!    ^                                        |                          |
//!    +----------------------------------------+--------------------------+
//!
//! cursor exhausted: flush partial batch, final commit --> Done
//! any failure: rollback (best effort) --> Failed
//! ```
//!
//! With `R` rows, batch size `B` and commit count `C` the loader executes
//! `ceil(R / B)` batches and commits `floor(ceil(R / B) / C)` times inside
//! the loop plus once unconditionally at the end.

use std::fmt;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::config::TransferOptions;
use crate::core::traits::TargetConnection;
use crate::core::value::Row;
use crate::error::{Result, TransferError};
use crate::source::PagedCursor;

/// Loader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// Reading rows and binding them into the pending batch.
    Binding,
    /// The pending batch reached the batch size.
    BatchFull,
    /// The batch is being sent to the target.
    Executing,
    /// Enough batches were executed to require a commit.
    CommitDue,
    /// Cursor exhausted and final commit issued.
    Done,
    /// A failure ended the load.
    Failed,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoaderState::Binding => "binding",
            LoaderState::BatchFull => "batch-full",
            LoaderState::Executing => "executing",
            LoaderState::CommitDue => "commit-due",
            LoaderState::Done => "done",
            LoaderState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters and timings of one transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferCounters {
    /// Rows read from the source and accepted by the target.
    pub rows_processed: u64,

    /// Time spent executing the source query.
    pub query_time: Duration,

    /// Time spent reading rows and binding them.
    pub fetch_time: Duration,

    /// Time spent executing insert batches.
    pub insert_time: Duration,

    /// Insert batches executed successfully.
    pub batches_executed: u64,

    /// Commits issued successfully.
    pub commits: u64,
}

/// Batch cadence for the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    /// Rows per insert batch.
    pub insert_batch_size: usize,

    /// Insert batches per commit.
    pub commit_batch_count: usize,
}

impl LoaderSettings {
    pub fn new(insert_batch_size: usize, commit_batch_count: usize) -> Result<Self> {
        if insert_batch_size == 0 {
            return Err(TransferError::Config(
                "insert_batch_size must be at least 1".to_string(),
            ));
        }
        if commit_batch_count == 0 {
            return Err(TransferError::Config(
                "commit_batch_count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            insert_batch_size,
            commit_batch_count,
        })
    }
}

impl From<&TransferOptions> for LoaderSettings {
    fn from(options: &TransferOptions) -> Self {
        Self {
            insert_batch_size: options.insert_batch_size(),
            commit_batch_count: options.commit_batch_count(),
        }
    }
}

/// A failed load, with the counters as they stood when it failed.
#[derive(Debug)]
pub struct LoadFailure {
    pub counters: TransferCounters,
    pub error: TransferError,
}

impl From<LoadFailure> for TransferError {
    fn from(failure: LoadFailure) -> Self {
        failure.error
    }
}

/// Drains a [`PagedCursor`] into a prepared insert on the target.
///
/// The insert statement must already be prepared on `target` with one
/// parameter per column.
pub struct BatchLoader<'a> {
    target: &'a mut dyn TargetConnection,
    column_count: usize,
    settings: LoaderSettings,
    cancel: Option<CancellationToken>,
    state: LoaderState,
    counters: TransferCounters,
    batch_rows: usize,
    batches_since_commit: usize,
}

impl<'a> BatchLoader<'a> {
    pub fn new(
        target: &'a mut dyn TargetConnection,
        column_count: usize,
        settings: LoaderSettings,
    ) -> Self {
        Self {
            target,
            column_count,
            settings,
            cancel: None,
            state: LoaderState::Binding,
            counters: TransferCounters::default(),
            batch_rows: 0,
            batches_since_commit: 0,
        }
    }

    /// Stop at the next row boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Start from existing counters (the caller may already have timed the query).
    pub fn with_counters(mut self, counters: TransferCounters) -> Self {
        self.counters = counters;
        self
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Run the load to completion.
    pub async fn run(
        mut self,
        cursor: &mut PagedCursor,
    ) -> std::result::Result<TransferCounters, LoadFailure> {
        match self.drain(cursor).await {
            Ok(()) => {
                self.transition(LoaderState::Done);
                info!(
                    "Rows obtained from source: {} ({} batches, {} commits)",
                    self.counters.rows_processed,
                    self.counters.batches_executed,
                    self.counters.commits
                );
                Ok(self.counters)
            }
            Err(error) => {
                let error = self.fail(error).await;
                info!("Rows obtained from source: {}", self.counters.rows_processed);
                Err(LoadFailure {
                    counters: self.counters,
                    error,
                })
            }
        }
    }

    async fn drain(&mut self, cursor: &mut PagedCursor) -> Result<()> {
        loop {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(TransferError::Cancelled);
            }

            let started = Instant::now();
            let has_row = cursor
                .advance()
                .await
                .map_err(|e| TransferError::transfer("fetching source rows", e))?;
            if !has_row {
                self.counters.fetch_time += started.elapsed();
                break;
            }
            let row = cursor.take_row().unwrap_or_default();
            self.bind_row(row)
                .map_err(|e| TransferError::transfer("binding row", e))?;
            self.counters.fetch_time += started.elapsed();

            self.counters.rows_processed += 1;
            self.batch_rows += 1;

            if self.batch_rows == self.settings.insert_batch_size {
                self.transition(LoaderState::BatchFull);
                self.execute_batch().await?;

                if self.batches_since_commit == self.settings.commit_batch_count {
                    self.transition(LoaderState::CommitDue);
                    self.commit().await?;
                    self.batches_since_commit = 0;
                    info!(
                        "Number of rows inserted so far: approximately {}",
                        self.counters.commits as usize
                            * self.settings.insert_batch_size
                            * self.settings.commit_batch_count
                    );
                }
                self.transition(LoaderState::Binding);
            }
        }

        if self.batch_rows > 0 {
            self.execute_batch().await?;
        }
        self.transition(LoaderState::CommitDue);
        self.commit().await
    }

    fn bind_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.column_count {
            return Err(TransferError::source_error(format!(
                "Row has {} values but {} columns were described",
                row.len(),
                self.column_count
            )));
        }
        for (i, value) in row.into_iter().enumerate() {
            self.target.bind_param(i + 1, value)?;
        }
        self.target.add_batch()
    }

    async fn execute_batch(&mut self) -> Result<()> {
        self.transition(LoaderState::Executing);
        let started = Instant::now();
        let result = self.target.execute_batch().await;
        self.counters.insert_time += started.elapsed();

        if let Err(e) = result {
            self.counters.rows_processed -= self.batch_rows as u64;
            return Err(TransferError::transfer("executing insert batch", e));
        }

        self.target.clear_batch();
        self.counters.batches_executed += 1;
        debug!(
            "Executed batch {} ({} rows)",
            self.counters.batches_executed, self.batch_rows
        );
        self.batch_rows = 0;
        self.batches_since_commit += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.target
            .commit()
            .await
            .map_err(|e| TransferError::transfer("committing", e))?;
        self.counters.commits += 1;
        debug!("Commit {} issued", self.counters.commits);
        Ok(())
    }

    /// Classify the failure, roll back, and return the error to report.
    async fn fail(&mut self, error: TransferError) -> TransferError {
        self.transition(LoaderState::Failed);

        let error = if error.is_session_killed() {
            info!(
                "\n*********************************************************\
                 \nThe target session in use has been killed by a 3rd party.\
                 \n*********************************************************"
            );
            TransferError::ExternalTermination {
                source: Box::new(error),
            }
        } else {
            if !matches!(error, TransferError::Cancelled) {
                error!(
                    "An error occurred while fetching source rows and inserting them into the target: {}",
                    error
                );
            }
            error
        };

        self.target.clear_batch();
        if let Err(e) = self.target.rollback().await {
            debug!("Rollback after failure also failed: {}", e);
        }
        error
    }

    fn transition(&mut self, next: LoaderState) {
        if self.state != next {
            trace!("Loader state {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SourceColumn;
    use crate::core::traits::{SourceConnection, TargetConnection};
    use crate::core::value::SqlValue;
    use crate::error::SESSION_KILLED_CODE;
    use crate::source::{MemoryPaging, MemorySource, RowEncoding};
    use crate::target::MemoryTarget;
    use crate::typemap::SourceType;

    fn rows(n: i64) -> Vec<Row> {
        (0..n).map(|i| vec![SqlValue::I64(i)]).collect()
    }

    async fn cursor(n: i64, paging: MemoryPaging) -> PagedCursor {
        let mut source = MemorySource::new(vec![SourceColumn::new("id", SourceType::BigInt)], rows(n))
            .with_paging(paging);
        let cursor = source.execute_query("SELECT id FROM t").await.unwrap();
        PagedCursor::open(cursor, 4).unwrap()
    }

    async fn prepared_target(target: MemoryTarget) -> MemoryTarget {
        let mut target = target;
        target.prepare_insert("INSERT INTO T (id) VALUES (?)", 1).await.unwrap();
        target
    }

    #[tokio::test]
    async fn test_batch_and_commit_cadence() {
        // R=23, B=4, C=2: 6 batches (5 full + 3 rows), commits after batches 2 and 4 + final.
        let mut target = prepared_target(MemoryTarget::new()).await;
        let log = target.log();
        let mut cur = cursor(23, MemoryPaging::Native).await;

        let counters = BatchLoader::new(&mut target, 1, LoaderSettings::new(4, 2).unwrap())
            .run(&mut cur)
            .await
            .unwrap();

        assert_eq!(counters.rows_processed, 23);
        assert_eq!(counters.batches_executed, 6);
        assert_eq!(log.batch_sizes(), vec![4, 4, 4, 4, 4, 3]);
        assert_eq!(counters.commits, 2 + 1);
        assert_eq!(log.commits(), 3);
        assert_eq!(log.committed_rows(), rows(23));
    }

    #[tokio::test]
    async fn test_exactly_full_last_cycle_gets_trailing_commit() {
        // R=8, B=4, C=2: 2 batches, one in-loop commit, then the final empty commit.
        let mut target = prepared_target(MemoryTarget::new()).await;
        let mut cur = cursor(8, MemoryPaging::FetchN(RowEncoding::Struct)).await;

        let counters = BatchLoader::new(&mut target, 1, LoaderSettings::new(4, 2).unwrap())
            .run(&mut cur)
            .await
            .unwrap();

        assert_eq!(counters.batches_executed, 2);
        assert_eq!(counters.commits, 2);
    }

    #[tokio::test]
    async fn test_empty_cursor_commits_once() {
        let mut target = prepared_target(MemoryTarget::new()).await;
        let log = target.log();
        let mut cur = cursor(0, MemoryPaging::Native).await;

        let counters = BatchLoader::new(&mut target, 1, LoaderSettings::new(4, 2).unwrap())
            .run(&mut cur)
            .await
            .unwrap();

        assert_eq!(counters.rows_processed, 0);
        assert_eq!(counters.batches_executed, 0);
        assert!(log.batch_sizes().is_empty());
        assert_eq!(log.commits(), 1);
    }

    #[tokio::test]
    async fn test_batch_failure_rolls_back_and_excludes_failed_rows() {
        let mut target = prepared_target(MemoryTarget::new().fail_batch(3, Some(1401))).await;
        let log = target.log();
        let mut cur = cursor(20, MemoryPaging::Native).await;

        let failure = BatchLoader::new(&mut target, 1, LoaderSettings::new(4, 10).unwrap())
            .run(&mut cur)
            .await
            .unwrap_err();

        assert_eq!(failure.counters.rows_processed, 8);
        assert_eq!(failure.counters.batches_executed, 2);
        match &failure.error {
            TransferError::TransferFailure { stage, .. } => {
                assert_eq!(*stage, "executing insert batch")
            }
            other => panic!("expected TransferFailure, got {:?}", other),
        }
        assert_eq!(log.rollbacks(), 1);
        assert!(log.committed_rows().is_empty());
    }

    #[tokio::test]
    async fn test_session_killed_on_commit_is_external_termination() {
        let mut target =
            prepared_target(MemoryTarget::new().fail_commit(1, Some(SESSION_KILLED_CODE)).fail_rollback())
                .await;
        let mut cur = cursor(10, MemoryPaging::Native).await;

        let failure = BatchLoader::new(&mut target, 1, LoaderSettings::new(5, 1).unwrap())
            .run(&mut cur)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            TransferError::ExternalTermination { .. }
        ));
        assert_eq!(failure.counters.rows_processed, 5);
    }

    #[tokio::test]
    async fn test_source_failure_takes_failure_path() {
        let mut source = MemorySource::new(vec![SourceColumn::new("id", SourceType::BigInt)], rows(10))
            .fail_fetch_at(6);
        let mut cur = PagedCursor::open(source.execute_query("q").await.unwrap(), 4).unwrap();
        let mut target = prepared_target(MemoryTarget::new()).await;
        let log = target.log();

        let failure = BatchLoader::new(&mut target, 1, LoaderSettings::new(4, 10).unwrap())
            .run(&mut cur)
            .await
            .unwrap_err();

        assert_eq!(failure.counters.rows_processed, 6);
        assert_eq!(failure.error.exit_code(), crate::error::EXIT_TRANSFER_FAILURE);
        assert_eq!(log.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_row_boundary() {
        let mut target = prepared_target(MemoryTarget::new()).await;
        let log = target.log();
        let mut cur = cursor(10, MemoryPaging::Native).await;
        let token = CancellationToken::new();
        token.cancel();

        let failure = BatchLoader::new(&mut target, 1, LoaderSettings::new(4, 2).unwrap())
            .with_cancellation(token)
            .run(&mut cur)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, TransferError::Cancelled));
        assert_eq!(failure.counters.rows_processed, 0);
        assert_eq!(log.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_row_width_mismatch_is_error() {
        let mut target = prepared_target(MemoryTarget::new()).await;
        let mut cur = cursor(1, MemoryPaging::Native).await;

        let failure = BatchLoader::new(&mut target, 2, LoaderSettings::new(4, 2).unwrap())
            .run(&mut cur)
            .await
            .unwrap_err();
        assert!(failure.error.format_detailed().contains("2 columns"));
    }

    #[test]
    fn test_settings_reject_zero() {
        assert!(LoaderSettings::new(0, 1).is_err());
        assert!(LoaderSettings::new(1, 0).is_err());
    }
}
