//! Interactive prompts: missing passwords and the table-creation retry.
//!
//! dialoguer blocks on the terminal, so every prompt runs on the blocking
//! pool and the runtime threads stay free.

use async_trait::async_trait;
use dialoguer::{Confirm, Password};
use query_transfer::{Config, RetryDecision, RetryPolicy, TransferError};
use tokio::task;
use tracing::warn;

fn prompt_error(e: impl std::fmt::Display) -> TransferError {
    TransferError::Io(std::io::Error::other(e.to_string()))
}

async fn prompt_password(user: &str, connection: &str) -> Result<String, TransferError> {
    let prompt = format!("Enter the password for {} at {}", user, connection);
    task::spawn_blocking(move || {
        Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
    })
    .await
    .map_err(prompt_error)?
    .map_err(prompt_error)
}

/// Ask for every password the configuration leaves unset.
pub async fn fill_missing_passwords(config: &mut Config) -> Result<(), TransferError> {
    if config.source.password.is_none() {
        config.source.password = Some(
            prompt_password(&config.source.user, &config.source.connection_string).await?,
        );
    }
    if config.target.password.is_none() {
        config.target.password = Some(
            prompt_password(&config.target.user, &config.target.connection_string).await?,
        );
    }
    Ok(())
}

/// Asks the operator on the terminal whether to retry table creation.
pub struct ConsoleRetry {
    table: String,
}

impl ConsoleRetry {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

/// Map a prompt outcome onto a decision. No answer means give up.
fn decision_from_answer<E: std::fmt::Display>(answer: Result<bool, E>) -> RetryDecision {
    match answer {
        Ok(true) => RetryDecision::Retry,
        Ok(false) => RetryDecision::Abort,
        Err(e) => {
            warn!("No answer to the retry prompt ({}); giving up", e);
            RetryDecision::Abort
        }
    }
}

#[async_trait]
impl RetryPolicy for ConsoleRetry {
    async fn decide(&mut self, attempt: u32, error: &TransferError) -> RetryDecision {
        eprintln!("\nAttempt {} to create {} failed: {}", attempt, self.table, error);
        let prompt = format!("Would you like to retry creating the table {}?", self.table);

        let answer = task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|answer| answer);

        decision_from_answer(answer)
    }
}
