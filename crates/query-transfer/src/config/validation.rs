//! Configuration validation.

use super::{clean_query, Config};
use crate::core::identifier::validate_identifier;
use crate::error::{Result, TransferError};

/// Validate the configuration.
///
/// Checks run in a fixed order and the first failure is reported, naming
/// the offending option.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.connection_string.trim().is_empty() {
        return Err(TransferError::Config(
            "source.connection_string is required".into(),
        ));
    }
    if config.source.user.is_empty() {
        return Err(TransferError::Config("source.user is required".into()));
    }

    // Target validation
    if config.target.connection_string.trim().is_empty() {
        return Err(TransferError::Config(
            "target.connection_string is required".into(),
        ));
    }
    if config.target.user.is_empty() {
        return Err(TransferError::Config("target.user is required".into()));
    }
    if config.target.table.trim().is_empty() {
        return Err(TransferError::Config("target.table is required".into()));
    }
    validate_identifier(&config.target.table)?;
    for name in [&config.target.schema, &config.target.tablespace]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
    {
        validate_identifier(name)?;
    }

    // Query: inline text or a file; inline text wins when both are set
    let has_query = config
        .transfer
        .query
        .as_deref()
        .is_some_and(|q| !clean_query(q).is_empty());
    if !has_query && config.transfer.query_file.is_none() {
        return Err(TransferError::Config(
            "transfer.query or transfer.query_file is required".into(),
        ));
    }

    if config.transfer.insert_batch_size == 0 {
        return Err(TransferError::Config(
            "transfer.insert_batch_size must be at least 1".into(),
        ));
    }
    if config.transfer.commit_batch_count == 0 {
        return Err(TransferError::Config(
            "transfer.commit_batch_count must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, TargetConfig, TransferConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                connection_string: "DSN=hive".to_string(),
                user: "hive".to_string(),
                password: Some("password".to_string()),
            },
            target: TargetConfig {
                connection_string: "DSN=oracle".to_string(),
                user: "scott".to_string(),
                password: Some("tiger".to_string()),
                schema: Some("ANALYTICS".to_string()),
                table: "DAILY_TOTALS".to_string(),
                tablespace: None,
            },
            transfer: TransferConfig {
                query: Some("SELECT * FROM sales".to_string()),
                ..TransferConfig::default()
            },
        }
    }

    fn error_of(config: &Config) -> String {
        validate(config).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_checks_run_in_order() {
        let mut config = valid_config();
        config.source.connection_string = String::new();
        config.target.table = String::new();
        assert!(error_of(&config).contains("source.connection_string"));

        let mut config = valid_config();
        config.source.user = String::new();
        config.target.user = String::new();
        assert!(error_of(&config).contains("source.user"));

        let mut config = valid_config();
        config.target.connection_string = " ".to_string();
        assert!(error_of(&config).contains("target.connection_string"));

        let mut config = valid_config();
        config.target.user = String::new();
        config.transfer.query = None;
        assert!(error_of(&config).contains("target.user"));

        let mut config = valid_config();
        config.target.table = String::new();
        assert!(error_of(&config).contains("target.table"));
    }

    #[test]
    fn test_query_required() {
        let mut config = valid_config();
        config.transfer.query = None;
        assert!(error_of(&config).contains("transfer.query or transfer.query_file"));
    }

    #[test]
    fn test_query_and_file_together_accepted() {
        let mut config = valid_config();
        config.transfer.query_file = Some("q.sql".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_terminator_only_query_is_missing() {
        let mut config = valid_config();
        config.transfer.query = Some(" ; ".to_string());
        assert!(error_of(&config).contains("transfer.query or transfer.query_file"));
    }

    #[test]
    fn test_zero_batch_settings_rejected() {
        let mut config = valid_config();
        config.transfer.insert_batch_size = 0;
        config.transfer.commit_batch_count = 0;
        assert!(error_of(&config).contains("insert_batch_size"));

        let mut config = valid_config();
        config.transfer.commit_batch_count = 0;
        assert!(error_of(&config).contains("commit_batch_count"));
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = Some("super_secret_password_123".to_string());
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = Some("super_secret_password_456".to_string());
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
