//! Configuration loading and validation.
//!
//! A YAML file provides the base configuration; command-line flags are
//! applied on top by the CLI before [`Config::validate`] runs.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use tracing::debug;

use crate::error::{Result, TransferError};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string. Not validated.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// The query text. An inline query wins; `transfer.query_file` is read
    /// only when no inline query is set.
    pub fn resolve_query(&self) -> Result<String> {
        if let Some(query) = self.transfer.query.as_deref().map(clean_query) {
            if !query.is_empty() {
                if let Some(path) = &self.transfer.query_file {
                    debug!(
                        "Inline query given; ignoring query file {}",
                        path.display()
                    );
                }
                return Ok(query.to_string());
            }
        }

        let path = self.transfer.query_file.as_ref().ok_or_else(|| {
            TransferError::Config("transfer.query or transfer.query_file is required".into())
        })?;
        let text = std::fs::read_to_string(path)?;
        let query = clean_query(&text);
        if query.is_empty() {
            return Err(TransferError::Config(format!(
                "query file {} is empty",
                path.display()
            )));
        }
        Ok(query.to_string())
    }

    /// Validate and build the options the engine runs with.
    pub fn transfer_options(&self) -> Result<TransferOptions> {
        self.validate()?;
        let mut options = TransferOptions::new(
            self.target.table.clone(),
            self.resolve_query()?,
            self.transfer.insert_batch_size,
            self.transfer.commit_batch_count,
        )?;
        if let Some(schema) = &self.target.schema {
            options = options.with_target_schema(schema.clone());
        }
        if let Some(tablespace) = &self.target.tablespace {
            options = options.with_target_tablespace(tablespace.clone());
        }
        Ok(options)
    }

    pub fn source_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            connection_string: self.source.connection_string.clone(),
            user: self.source.user.clone(),
            password: self.source.password.clone(),
        }
    }

    pub fn target_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            connection_string: self.target.connection_string.clone(),
            user: self.target.user.clone(),
            password: self.target.password.clone(),
        }
    }
}

/// Trim surrounding whitespace and one trailing statement terminator.
pub(crate) fn clean_query(text: &str) -> &str {
    let text = text.trim();
    text.strip_suffix(';').unwrap_or(text).trim_end()
}
