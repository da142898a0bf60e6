use std::time::Duration;

use serde::Deserialize;

use crate::{error::Error, poll::PollOptions, purge::DEFAULT_PURGE_SETTLE};

/// Settings read from `REDRIVE_*` environment variables.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    pub queue_id: Option<String>,
    pub queue_url: Option<String>,
    pub dlq_url: Option<String>,

    pub region: Option<String>,
    pub endpoint_url: Option<String>,

    pub poll_rounds: Option<u32>,
    pub poll_round_delay_ms: Option<u64>,
    pub poll_wait_time_seconds: Option<u32>,
    pub poll_visibility_timeout: Option<u32>,
    pub purge_settle_ms: Option<u64>,
    pub max_retry_rounds: Option<u32>,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        Ok(envy::prefixed("REDRIVE_").from_env::<Self>()?)
    }

    pub fn queue_id(&self) -> &str {
        self.queue_id.as_deref().unwrap_or("queue")
    }

    pub fn poll_options(&self) -> PollOptions {
        let defaults = PollOptions::default();
        PollOptions {
            rounds: self.poll_rounds.unwrap_or(defaults.rounds),
            round_delay: self
                .poll_round_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.round_delay),
            wait_time_seconds: self
                .poll_wait_time_seconds
                .unwrap_or(defaults.wait_time_seconds),
            max_messages: defaults.max_messages,
            visibility_timeout: self
                .poll_visibility_timeout
                .unwrap_or(defaults.visibility_timeout),
        }
    }

    pub fn purge_settle(&self) -> Duration {
        self.purge_settle_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PURGE_SETTLE)
    }

    pub fn max_retry_rounds(&self) -> u32 {
        self.max_retry_rounds.unwrap_or(100)
    }
}
