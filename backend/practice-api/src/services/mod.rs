use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::utils::retry::RetryConfig;

pub mod attempt_ledger;
pub mod disclosure_gate;
pub mod episode_sequencer;
pub mod oracle;
pub mod registry;
pub mod report_lock;
pub mod session_cell;

#[cfg(test)]
pub(crate) mod test_support;

use oracle::{HttpOracle, LearningOracle};
use registry::SessionRegistry;

pub struct AppState {
    pub config: Config,
    pub http: reqwest::Client,
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.learning_api_timeout_ms))
            .build()?;

        tracing::info!(
            "Learning API client ready: {} (timeout {}ms)",
            config.learning_api_url,
            config.learning_api_timeout_ms
        );

        Ok(Self {
            config,
            http,
            registry: SessionRegistry::default(),
        })
    }

    /// A learning API client acting for one student.
    pub fn oracle_for(&self, bearer: Option<String>) -> Arc<dyn LearningOracle> {
        Arc::new(HttpOracle::new(
            self.http.clone(),
            &self.config.learning_api_url,
            bearer,
        ))
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_attempts(self.config.learning_api_retry_attempts)
    }
}
