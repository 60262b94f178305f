//! Error types for the transfer engine.

use thiserror::Error;

/// Native error code a target reports when its session was killed by a
/// third party (Oracle `ORA-00028: your session has been killed`).
pub const SESSION_KILLED_CODE: i32 = 28;

/// Process exit codes, one per failure class.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_CONNECTION_ERROR: u8 = 2;
pub const EXIT_UNSUPPORTED_TYPE: u8 = 3;
pub const EXIT_PROVISION_FAILURE: u8 = 4;
pub const EXIT_TRANSFER_FAILURE: u8 = 5;
pub const EXIT_EXTERNAL_TERMINATION: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Missing or invalid option, detected before any connection is used.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connecting to a database or talking to its driver failed.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// A source column's wire type has no target mapping.
    #[error("Unsupported source type code {type_code} for column '{column}'")]
    UnsupportedType { column: String, type_code: i32 },

    /// The target table could not be created and the retry was declined.
    #[error("Unable to create target table {table}: {message}")]
    ProvisionFailure { table: String, message: String },

    /// The target session was closed by another party mid-transfer.
    #[error("Target session was terminated by another party")]
    ExternalTermination {
        #[source]
        source: Box<TransferError>,
    },

    /// Any other failure on the fetch, insert or commit path.
    #[error("Transfer failed while {stage}")]
    TransferFailure {
        stage: &'static str,
        #[source]
        source: Box<TransferError>,
    },

    /// Error reported by the source driver.
    #[error("Source error: {message}")]
    Source { message: String, code: Option<i32> },

    /// Error reported by the target driver.
    #[error("Target error: {message}")]
    Target { message: String, code: Option<i32> },

    /// IO error (query file, config file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transfer was cancelled (SIGINT, etc.)
    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        TransferError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a source driver error without a native code.
    pub fn source_error(message: impl Into<String>) -> Self {
        TransferError::Source {
            message: message.into(),
            code: None,
        }
    }

    /// Create a target driver error, keeping the driver's native code.
    pub fn target_error(message: impl Into<String>, code: Option<i32>) -> Self {
        TransferError::Target {
            message: message.into(),
            code,
        }
    }

    /// Wrap an error as a failure of the given transfer stage.
    pub fn transfer(stage: &'static str, source: TransferError) -> Self {
        TransferError::TransferFailure {
            stage,
            source: Box::new(source),
        }
    }

    /// Whether the error, or anything it wraps, carries the target's
    /// "session killed" native code.
    pub fn is_session_killed(&self) -> bool {
        match self {
            TransferError::Target { code, .. } | TransferError::Source { code, .. } => {
                *code == Some(SESSION_KILLED_CODE)
            }
            TransferError::ExternalTermination { .. } => true,
            TransferError::TransferFailure { source, .. } => source.is_session_killed(),
            _ => false,
        }
    }

    /// Exit status the CLI reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            TransferError::Config(_) | TransferError::Yaml(_) | TransferError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            TransferError::Connection { .. } => EXIT_CONNECTION_ERROR,
            TransferError::UnsupportedType { .. } => EXIT_UNSUPPORTED_TYPE,
            TransferError::ProvisionFailure { .. } => EXIT_PROVISION_FAILURE,
            TransferError::ExternalTermination { .. } => EXIT_EXTERNAL_TERMINATION,
            TransferError::TransferFailure { source, .. } if source.is_cancelled() => {
                EXIT_CANCELLED
            }
            TransferError::TransferFailure { .. }
            | TransferError::Source { .. }
            | TransferError::Target { .. } => EXIT_TRANSFER_FAILURE,
            TransferError::Io(_) => EXIT_IO_ERROR,
            TransferError::Cancelled => EXIT_CANCELLED,
        }
    }

    fn is_cancelled(&self) -> bool {
        match self {
            TransferError::Cancelled => true,
            TransferError::TransferFailure { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Native error code of the first diagnostic record, if the driver sent one.
pub(crate) fn odbc_native_code(err: &odbc_api::Error) -> Option<i32> {
    match err {
        odbc_api::Error::Diagnostics { record, .. } => Some(record.native_error),
        _ => None,
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_killed_detected_through_wrapping() {
        let err = TransferError::transfer(
            "executing insert batch",
            TransferError::target_error("ORA-00028: your session has been killed", Some(28)),
        );
        assert!(err.is_session_killed());

        let other = TransferError::transfer(
            "executing insert batch",
            TransferError::target_error("ORA-01401: inserted value too large", Some(1401)),
        );
        assert!(!other.is_session_killed());
    }

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        assert_eq!(TransferError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            TransferError::UnsupportedType {
                column: "ts".into(),
                type_code: 93
            }
            .exit_code(),
            EXIT_UNSUPPORTED_TYPE
        );
        assert_eq!(
            TransferError::ProvisionFailure {
                table: "t".into(),
                message: "exists".into()
            }
            .exit_code(),
            EXIT_PROVISION_FAILURE
        );
        assert_eq!(
            TransferError::ExternalTermination {
                source: Box::new(TransferError::target_error("killed", Some(28)))
            }
            .exit_code(),
            EXIT_EXTERNAL_TERMINATION
        );
        assert_eq!(
            TransferError::transfer("committing", TransferError::target_error("boom", None)).exit_code(),
            EXIT_TRANSFER_FAILURE
        );
        assert_eq!(
            TransferError::transfer("binding row", TransferError::Cancelled).exit_code(),
            EXIT_CANCELLED
        );
    }

    #[test]
    fn test_format_detailed_includes_cause_chain() {
        let err = TransferError::transfer(
            "committing",
            TransferError::target_error("ORA-02091: transaction rolled back", Some(2091)),
        );
        let text = err.format_detailed();
        assert!(text.starts_with("Error: Transfer failed while committing"));
        assert!(text.contains("Caused by:\n  1: Target error: ORA-02091"));
    }
}
