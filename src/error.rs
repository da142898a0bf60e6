use snafu::Snafu;

use crate::sqs::method::Method;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "Could not find the {output} of queue {queue}, make sure the queue is deployed first"
    ))]
    MissingDeploymentOutput { queue: String, output: String },

    #[snafu(display(
        "{method} failed{}: {message}",
        code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default()
    ))]
    Transport {
        method: Method,
        code: Option<String>,
        message: String,
    },

    #[snafu(display("Unexpected {received} response to {method}"))]
    UnexpectedResponse { method: Method, received: Method },

    #[snafu(display("Invalid message: {message}"))]
    InvalidMessage { message: String },

    #[snafu(display("Invalid parameter: {message}"))]
    InvalidParameter { message: String },

    #[snafu(display("Invalid queue URL {url}"))]
    InvalidUrl {
        url: String,
        #[snafu(source)]
        source: url::ParseError,
    },

    #[snafu(display("Error loading configuration"))]
    Config {
        #[snafu(source)]
        source: envy::Error,
    },
}

impl From<envy::Error> for Error {
    fn from(source: envy::Error) -> Self {
        Self::Config { source }
    }
}

impl Error {
    pub fn missing_output(queue: impl Into<String>, output: impl Into<String>) -> Self {
        Self::MissingDeploymentOutput {
            queue: queue.into(),
            output: output.into(),
        }
    }

    pub fn transport(
        method: Method,
        code: Option<impl Into<String>>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            method,
            code: code.map(Into::into),
            message: message.into(),
        }
    }

    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Whether the operator should be told to deploy before retrying the command.
    pub fn is_missing_deployment(&self) -> bool {
        matches!(self, Self::MissingDeploymentOutput { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = Error::transport(
            Method::PurgeQueue,
            Some("AWS.SimpleQueueService.PurgeQueueInProgress"),
            "Only one PurgeQueue operation is allowed every 60 seconds.",
        );
        assert_eq!(
            err.to_string(),
            "AmazonSQS.PurgeQueue failed (AWS.SimpleQueueService.PurgeQueueInProgress): \
             Only one PurgeQueue operation is allowed every 60 seconds."
        );

        let err = Error::transport(Method::ReceiveMessage, None::<String>, "dispatch failure");
        assert_eq!(
            err.to_string(),
            "AmazonSQS.ReceiveMessage failed: dispatch failure"
        );
    }

    #[test]
    fn test_missing_output_display() {
        let err = Error::missing_output("jobs", "dead letter queue URL");
        assert!(err.is_missing_deployment());
        assert_eq!(
            err.to_string(),
            "Could not find the dead letter queue URL of queue jobs, make sure the queue is deployed first"
        );
    }
}
