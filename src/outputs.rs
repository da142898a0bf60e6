//! Deployed queue URLs, as exposed by the queue construct.

use crate::{config::Config, error::Error};

/// What a deployed queue construct knows about its queues.
///
/// Either URL is `None` while the infrastructure has not been deployed yet.
pub trait QueueOutputs {
    /// Name of the construct, used in operator-facing messages.
    fn id(&self) -> &str;

    fn queue_url(&self) -> Option<String>;

    fn dead_letter_queue_url(&self) -> Option<String>;

    fn require_queue_url(&self) -> Result<String, Error> {
        let url = self
            .queue_url()
            .ok_or_else(|| Error::missing_output(self.id(), "queue URL"))?;
        validate(url)
    }

    fn require_dead_letter_queue_url(&self) -> Result<String, Error> {
        let url = self
            .dead_letter_queue_url()
            .ok_or_else(|| Error::missing_output(self.id(), "dead letter queue URL"))?;
        validate(url)
    }
}

fn validate(url: String) -> Result<String, Error> {
    match url::Url::parse(&url) {
        Ok(_) => Ok(url),
        Err(source) => Err(Error::InvalidUrl { url, source }),
    }
}

/// Queue outputs known up front, e.g. from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedQueue {
    pub id: String,
    pub queue_url: Option<String>,
    pub dead_letter_queue_url: Option<String>,
}

impl DeployedQueue {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            queue_url: None,
            dead_letter_queue_url: None,
        }
    }

    pub fn with_queue_url(mut self, url: impl Into<String>) -> Self {
        self.queue_url = Some(url.into());
        self
    }

    pub fn with_dead_letter_queue_url(mut self, url: impl Into<String>) -> Self {
        self.dead_letter_queue_url = Some(url.into());
        self
    }
}

impl From<&Config> for DeployedQueue {
    fn from(config: &Config) -> Self {
        Self {
            id: config.queue_id().to_owned(),
            queue_url: config.queue_url.clone(),
            dead_letter_queue_url: config.dlq_url.clone(),
        }
    }
}

impl QueueOutputs for DeployedQueue {
    fn id(&self) -> &str {
        &self.id
    }

    fn queue_url(&self) -> Option<String> {
        self.queue_url.clone()
    }

    fn dead_letter_queue_url(&self) -> Option<String> {
        self.dead_letter_queue_url.clone()
    }
}
