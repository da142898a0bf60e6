//! Command line surface of the `redrive` binary.

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "redrive")]
#[command(about = "Inspect, purge and retry the dead letter queue of an SQS queue")]
#[command(version)]
pub struct Args {
    /// Name of the queue, used in output
    #[arg(long, global = true)]
    pub queue_id: Option<String>,

    /// URL of the main queue (overrides REDRIVE_QUEUE_URL)
    #[arg(long, global = true)]
    pub queue_url: Option<String>,

    /// URL of the dead letter queue (overrides REDRIVE_DLQ_URL)
    #[arg(long, global = true)]
    pub dlq_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the failed messages in the dead letter queue
    #[command(name = "failed")]
    Failed,

    /// Delete all failed messages from the dead letter queue
    #[command(name = "failed:purge")]
    FailedPurge,

    /// Move failed messages back to the main queue
    #[command(name = "failed:retry")]
    FailedRetry,

    /// Send a message to the main queue
    Send {
        /// Body of the message
        #[arg(long)]
        body: String,

        /// Message group, required for FIFO queues
        #[arg(long)]
        group_id: Option<String>,
    },
}

impl Args {
    /// Applies the flags given on the command line over `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(queue_id) = &self.queue_id {
            config.queue_id = Some(queue_id.clone());
        }
        if let Some(queue_url) = &self.queue_url {
            config.queue_url = Some(queue_url.clone());
        }
        if let Some(dlq_url) = &self.dlq_url {
            config.dlq_url = Some(dlq_url.clone());
        }
    }
}
