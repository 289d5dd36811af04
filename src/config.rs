//! Settings for talking to the language model, built once at start-up and
//! passed to the engines that need them.

use std::{path::PathBuf, time::Duration};

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};

/// Where and how to reach the language model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// The base URL of an OpenAI-compatible API, e.g. "http://localhost:11434/v1".
    pub base_url: String,
    /// The bearer token sent with each request.
    pub api_key: String,
    /// The model used to extract transactions from text.
    pub text_model: String,
    /// The model used to extract transactions from receipt photos.
    pub vision_model: String,
    /// The model used to translate questions into SQL.
    pub sql_model: String,
    /// How long to wait for a single completion before giving up.
    pub request_timeout: Duration,
    /// How often to ask again when the model's answer does not fit the schema.
    pub retry: RetryPolicy,
    /// Where uploaded images are staged, defaults to the system temp directory.
    pub temp_dir: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_owned(),
            api_key: "ollama".to_owned(),
            text_model: "llama3.1".to_owned(),
            vision_model: "llama3.2-vision".to_owned(),
            sql_model: "llama3.1".to_owned(),
            request_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            temp_dir: None,
        }
    }
}

/// A bounded, sequential retry schedule.
///
/// The same policy applies to text extraction, image extraction and query
/// synthesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// The total number of attempts, including the first one. At least 1.
    pub max_attempts: u32,
    /// The pause before the second attempt.
    pub initial_delay: Duration,
    /// The longest pause between two attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries `max_attempts` times without pausing in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// The number of attempts to make, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Start a new schedule of pauses between attempts.
    pub fn schedule(&self) -> RetrySchedule {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();

        RetrySchedule { backoff }
    }
}

/// The pauses between consecutive attempts of one operation.
pub struct RetrySchedule {
    backoff: ExponentialBackoff,
}

impl RetrySchedule {
    /// Sleep for the next pause in the schedule.
    pub async fn wait(&mut self) {
        let delay = self.backoff.next_backoff().unwrap_or_default();

        if !delay.is_zero() {
            tracing::debug!("Waiting {:.2}s before retrying", delay.as_secs_f32());
            tokio::time::sleep(delay).await;
        }
    }
}
