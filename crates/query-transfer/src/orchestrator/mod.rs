//! Transfer orchestrator: runs one query-to-table transfer end to end.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::TransferOptions;
use crate::core::traits::{RetryPolicy, SourceConnection, TargetConnection};
use crate::error::{Result, TransferError};
use crate::provision::{create_table_with_retry, NeverRetry};
use crate::schema::synthesize;
use crate::source::PagedCursor;
use crate::target::build_insert_sql;
use crate::transfer::{BatchLoader, LoaderSettings, TransferCounters};

/// Module name reported to the target's session monitoring.
pub const PRODUCT_NAME: &str = "query-transfer";

/// Result of a successful transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// `[schema.]table` that was created and loaded.
    pub target_table: String,

    /// When the transfer started.
    pub started_at: DateTime<Utc>,

    /// When the transfer completed.
    pub completed_at: DateTime<Utc>,

    /// Total wall time in seconds.
    pub total_seconds: f64,

    /// Rows read from the source and inserted.
    pub rows_processed: u64,

    /// Time spent executing the source query, in seconds.
    pub query_seconds: f64,

    /// Time spent fetching and binding rows, in seconds.
    pub fetch_seconds: f64,

    /// Time spent executing insert batches, in seconds.
    pub insert_seconds: f64,

    /// Insert batches executed.
    pub batches_executed: u64,

    /// Commits issued.
    pub commits: u64,

    /// Raw counters.
    #[serde(skip)]
    pub counters: TransferCounters,
}

impl TransferSummary {
    fn new(
        run_id: String,
        target_table: String,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        counters: TransferCounters,
    ) -> Self {
        Self {
            run_id,
            target_table,
            started_at,
            completed_at: Utc::now(),
            total_seconds: elapsed.as_secs_f64(),
            rows_processed: counters.rows_processed,
            query_seconds: counters.query_time.as_secs_f64(),
            fetch_seconds: counters.fetch_time.as_secs_f64(),
            insert_seconds: counters.insert_time.as_secs_f64(),
            batches_executed: counters.batches_executed,
            commits: counters.commits,
            counters,
        }
    }

    /// Serialize the summary as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable final report.
    pub fn report(&self) -> String {
        format!(
            "\n********************************************************************\n\
             \tTotal time                         : {:.3} sec.\n\
             \tNumber of records processed        : {}\n\
             \tTime spent executing source query  : {:.3} sec.\n\
             \tTime spent fetching source data    : {:.3} sec.\n\
             \tTime spent inserting into target   : {:.3} sec.\n\
             ********************************************************************",
            self.total_seconds,
            self.rows_processed,
            self.query_seconds,
            self.fetch_seconds,
            self.insert_seconds
        )
    }
}

/// Runs transfers with a configured retry policy and cancellation token.
///
/// ```rust,no_run
/// use query_transfer::{MemorySource, MemoryTarget, Orchestrator, TransferOptions};
///
/// # async fn example() -> query_transfer::Result<()> {
/// let options = TransferOptions::new("DAILY_TOTALS", "SELECT * FROM sales", 500, 20)?;
/// let mut source = MemorySource::new(vec![], vec![]);
/// let mut target = MemoryTarget::new();
/// let summary = Orchestrator::new(options).run(&mut source, &mut target).await?;
/// println!("{}", summary.report());
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    options: TransferOptions,
    policy: Box<dyn RetryPolicy>,
    cancel: Option<CancellationToken>,
}

impl Orchestrator {
    /// Create an orchestrator that never retries table creation.
    pub fn new(options: TransferOptions) -> Self {
        Self {
            options,
            policy: Box::new(NeverRetry),
            cancel: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub async fn run(
        mut self,
        source: &mut dyn SourceConnection,
        target: &mut dyn TargetConnection,
    ) -> Result<TransferSummary> {
        run_transfer(
            source,
            target,
            &self.options,
            self.policy.as_mut(),
            self.cancel.clone(),
        )
        .await
    }
}

/// Run one transfer: query the source, create the target table and load it.
///
/// Failures are returned, not logged here; the caller reports them once
/// with [`TransferError::format_detailed`].
pub async fn run_transfer(
    source: &mut dyn SourceConnection,
    target: &mut dyn TargetConnection,
    options: &TransferOptions,
    policy: &mut dyn RetryPolicy,
    cancel: Option<CancellationToken>,
) -> Result<TransferSummary> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let started = Instant::now();
    let table = options.qualified_table();

    info!(
        "Starting transfer run {}: {} -> {} ({})",
        run_id,
        source.db_type(),
        target.db_type(),
        table
    );

    let counters = execute(source, target, options, policy, cancel).await?;
    let summary = TransferSummary::new(run_id, table, started_at, started.elapsed(), counters);
    info!(
        "Transfer run {} completed: {} rows in {:.3}s",
        summary.run_id, summary.rows_processed, summary.total_seconds
    );
    Ok(summary)
}

async fn execute(
    source: &mut dyn SourceConnection,
    target: &mut dyn TargetConnection,
    options: &TransferOptions,
    policy: &mut dyn RetryPolicy,
    cancel: Option<CancellationToken>,
) -> Result<TransferCounters> {
    let table = options.qualified_table();

    if let Err(e) = target.initialize_session(PRODUCT_NAME, &table).await {
        error!(
            "An error occurred while initializing the target session: {}",
            e
        );
    }

    info!("Running: {}", options.query());
    let started = Instant::now();
    let cursor = source
        .execute_query(options.query())
        .await
        .map_err(|e| TransferError::transfer("executing source query", e))?;
    let counters = TransferCounters {
        query_time: started.elapsed(),
        ..TransferCounters::default()
    };
    info!("Source query executed in {:.3}s", counters.query_time.as_secs_f64());

    let descriptors = synthesize(cursor.columns())?;
    create_table_with_retry(target, &descriptors, options, policy).await?;

    let column_names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    let insert_sql = build_insert_sql(&table, &column_names);
    info!("INSERT SQL: {}", insert_sql);
    target
        .prepare_insert(&insert_sql, descriptors.len())
        .await
        .map_err(|e| TransferError::transfer("preparing insert statement", e))?;

    let mut cursor = PagedCursor::open(cursor, options.insert_batch_size())?;
    info!("Source paging mode: {}", cursor.mode());

    let mut loader = BatchLoader::new(target, descriptors.len(), LoaderSettings::from(options))
        .with_counters(counters);
    if let Some(token) = cancel {
        loader = loader.with_cancellation(token);
    }

    loader.run(&mut cursor).await.map_err(|failure| {
        error!(
            "Transfer stopped after {} rows ({} batches executed, {} commits)",
            failure.counters.rows_processed,
            failure.counters.batches_executed,
            failure.counters.commits
        );
        failure.error
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SourceColumn;
    use crate::core::value::SqlValue;
    use crate::source::MemorySource;
    use crate::target::MemoryTarget;
    use crate::typemap::SourceType;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn source() -> MemorySource {
        MemorySource::new(
            vec![
                SourceColumn::new("_c0", SourceType::Varchar),
                SourceColumn::new("total", SourceType::Double),
            ],
            vec![
                vec![SqlValue::from("east"), SqlValue::F64(10.5)],
                vec![SqlValue::from("west"), SqlValue::Null],
            ],
        )
    }

    fn options() -> TransferOptions {
        TransferOptions::new("TOTALS", "SELECT region, SUM(x) FROM t GROUP BY region", 500, 20)
            .unwrap()
            .with_target_schema("ANALYTICS")
    }

    #[tokio::test]
    async fn test_run_creates_table_and_loads_rows() {
        let mut src = source();
        let mut target = MemoryTarget::new();
        let log = target.log();

        let summary = Orchestrator::new(options())
            .run(&mut src, &mut target)
            .await
            .unwrap();

        assert_eq!(summary.rows_processed, 2);
        assert_eq!(summary.target_table, "ANALYTICS.TOTALS");
        assert_eq!(
            log.created_tables(),
            vec!["CREATE TABLE ANALYTICS.TOTALS (c0 VARCHAR2(4000), total NUMBER)".to_string()]
        );
        assert_eq!(
            log.prepared_insert().as_deref(),
            Some("INSERT INTO ANALYTICS.TOTALS (c0,total) VALUES (?,?)")
        );
        assert_eq!(
            log.session_labels(),
            vec![(PRODUCT_NAME.to_string(), "ANALYTICS.TOTALS".to_string())]
        );
        assert_eq!(log.committed_rows().len(), 2);
    }

    #[tokio::test]
    async fn test_session_init_failure_is_not_fatal() {
        let mut src = source();
        let mut target = MemoryTarget::new().fail_session_init();
        let summary = Orchestrator::new(options())
            .run(&mut src, &mut target)
            .await
            .unwrap();
        assert_eq!(summary.rows_processed, 2);
    }

    #[tokio::test]
    async fn test_query_failure_stops_before_ddl() {
        let mut src = source().fail_query("Table not found 'sales'");
        let mut target = MemoryTarget::new();
        let log = target.log();

        let err = Orchestrator::new(options())
            .run(&mut src, &mut target)
            .await
            .unwrap_err();
        assert!(err.format_detailed().contains("Table not found"));
        assert_eq!(log.ddl_attempts(), 0);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_failure_is_returned_without_detailed_log() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut src = source().fail_query("Table not found 'sales'");
        let mut target = MemoryTarget::new();
        let err = Orchestrator::new(options())
            .run(&mut src, &mut target)
            .await
            .unwrap_err();

        let logged = logs.text();
        assert!(logged.contains("Starting transfer run"));
        assert!(!logged.contains("Caused by"));
        assert!(!logged.contains(&err.to_string()));
        assert!(err.format_detailed().contains("Caused by"));
    }

    #[tokio::test]
    async fn test_summary_json() {
        let mut src = source();
        let mut target = MemoryTarget::new();
        let summary = Orchestrator::new(options())
            .run(&mut src, &mut target)
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["rows_processed"], 2);
        assert_eq!(json["target_table"], "ANALYTICS.TOTALS");
        assert!(json.get("counters").is_none());
        assert!(summary.report().contains("Number of records processed        : 2"));
    }
}
