//! query-transfer CLI - copy the result of a Hive query into a new Oracle table.

mod prompts;

use clap::{Args, Parser, Subcommand};
use query_transfer::{
    Config, NeverRetry, OdbcSource, OdbcTarget, Orchestrator, TransferError, PRODUCT_NAME,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::prompts::{fill_missing_passwords, ConsoleRetry};

#[derive(Parser)]
#[command(name = "query-transfer")]
#[command(about = "Copy the result of a Hive query into a new Oracle table")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the query and load its result into a new target table
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Fail immediately when the target table cannot be created
        #[arg(long)]
        no_retry_prompt: bool,

        /// Output JSON result to stdout
        #[arg(long)]
        output_json: bool,
    },

    /// Validate options and print the resolved settings without connecting
    CheckConfig {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Values that replace the corresponding configuration file entries.
#[derive(Args, Default)]
struct Overrides {
    /// Source ODBC connection string
    #[arg(long)]
    source: Option<String>,

    /// Source user
    #[arg(long)]
    source_user: Option<String>,

    /// Source password (prompted for when unset)
    #[arg(long, env = "QT_SOURCE_PASSWORD", hide_env_values = true)]
    source_password: Option<String>,

    /// Target ODBC connection string
    #[arg(long)]
    target: Option<String>,

    /// Target user
    #[arg(long)]
    target_user: Option<String>,

    /// Target password (prompted for when unset)
    #[arg(long, env = "QT_TARGET_PASSWORD", hide_env_values = true)]
    target_password: Option<String>,

    /// Schema to create the target table in
    #[arg(long)]
    target_schema: Option<String>,

    /// Name of the target table to create
    #[arg(long)]
    target_table: Option<String>,

    /// Tablespace for the target table
    #[arg(long)]
    target_tablespace: Option<String>,

    /// Query to run against the source
    #[arg(long, conflicts_with = "query_file")]
    query: Option<String>,

    /// File containing the query to run
    #[arg(long)]
    query_file: Option<PathBuf>,

    /// Rows per insert batch
    #[arg(long)]
    insert_batch_size: Option<usize>,

    /// Insert batches per commit
    #[arg(long)]
    commit_batch_count: Option<usize>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.source {
            config.source.connection_string = v;
        }
        if let Some(v) = self.source_user {
            config.source.user = v;
        }
        if let Some(v) = self.source_password {
            config.source.password = Some(v);
        }
        if let Some(v) = self.target {
            config.target.connection_string = v;
        }
        if let Some(v) = self.target_user {
            config.target.user = v;
        }
        if let Some(v) = self.target_password {
            config.target.password = Some(v);
        }
        if let Some(v) = self.target_schema {
            config.target.schema = Some(v);
        }
        if let Some(v) = self.target_table {
            config.target.table = v;
        }
        if let Some(v) = self.target_tablespace {
            config.target.tablespace = Some(v);
        }
        // A query given on the command line replaces whichever form the file used.
        if let Some(v) = self.query {
            config.transfer.query = Some(v);
            config.transfer.query_file = None;
        }
        if let Some(v) = self.query_file {
            config.transfer.query_file = Some(v);
            config.transfer.query = None;
        }
        if let Some(v) = self.insert_batch_size {
            config.transfer.insert_batch_size = v;
        }
        if let Some(v) = self.commit_batch_count {
            config.transfer.commit_batch_count = v;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), TransferError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);
    show_welcome_message();

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    match cli.command {
        Commands::CheckConfig { overrides } => {
            overrides.apply(&mut config);
            let options = config.transfer_options()?;

            let resolved = serde_json::json!({
                "source": config.source_settings().describe(),
                "target": config.target_settings().describe(),
                "target_table": options.qualified_table(),
                "options": options,
            });
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }

        Commands::Run {
            overrides,
            no_retry_prompt,
            output_json,
        } => {
            overrides.apply(&mut config);
            let options = config.transfer_options()?;
            fill_missing_passwords(&mut config).await?;

            let cancel_token = setup_signal_handler();

            let source_settings = config.source_settings();
            info!("Connecting to source {}", source_settings.describe());
            let mut source = OdbcSource::connect(&source_settings).await?;

            let target_settings = config.target_settings();
            info!("Connecting to target {}", target_settings.describe());
            let mut target = OdbcTarget::connect(&target_settings).await?;

            let table = options.qualified_table();
            let mut orchestrator = Orchestrator::new(options).with_cancellation(cancel_token);
            orchestrator = if no_retry_prompt {
                orchestrator.with_retry_policy(NeverRetry)
            } else {
                orchestrator.with_retry_policy(ConsoleRetry::new(table))
            };

            let summary = orchestrator.run(&mut source, &mut target).await?;

            if output_json {
                println!("{}", summary.to_json()?);
            } else {
                println!("{}", summary.report());
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout carries only the report or JSON.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn show_welcome_message() {
    let line = format!("Using {} {}", PRODUCT_NAME, env!("CARGO_PKG_VERSION"));
    let border = "*".repeat(line.len() + 8);
    info!("\n{}\n*** {} ***\n{}", border, line, border);
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Rolling back and shutting down...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Unable to install {} handler: {}", name, e),
        }
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Rolling back and shutting down...");
            token.cancel();
        }
    });

    cancel_token
}
