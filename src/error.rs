use std::error::Error as StdError;

use thiserror::Error;

use crate::bus::PublishError;

/// Result returned by listeners and interceptors.
pub type ListenerResult = Result<(), ListenerError>;

/// Error type for listener and interceptor invocations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Halt the remaining listeners for this dispatch. Not a failure: the
    /// caller of `dispatch` sees `Ok(())`.
    #[error("propagation stopped")]
    StopPropagation,
    /// The listener refused the event (validation, invariant violation).
    #[error("rejected: {0}")]
    Rejected(String),
    /// The listener observed a cancelled context and gave up.
    #[error("cancelled")]
    Cancelled,
    /// Other error.
    #[error("listener error: {0}")]
    Other(#[source] Box<dyn StdError + Send + Sync>),
}

impl ListenerError {
    /// Wrap any error as `ListenerError::Other`.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        ListenerError::Other(err.into())
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, ListenerError::StopPropagation)
    }
}

impl From<serde_json::Error> for ListenerError {
    fn from(err: serde_json::Error) -> Self {
        ListenerError::Other(Box::new(err))
    }
}

/// Error returned to the caller of a synchronous dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The resolved driver is external but neither the call nor the matched
    /// route named a topic.
    #[error("topic required for external delivery of {event}")]
    TopicRequired { event: String },
    /// The resolved driver is external but the dispatcher has no publisher.
    #[error("no publisher configured for external delivery of {event}")]
    PublisherMissing { event: String },
    /// A synchronous listener failed; remaining listeners were skipped.
    #[error("listener failed for {event}: {source}")]
    Listener {
        event: String,
        #[source]
        source: ListenerError,
    },
    /// The event body could not be serialized. Nothing was published.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Received bytes or an envelope body could not be decoded.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
    /// The publisher rejected the message.
    #[error(transparent)]
    Publish(#[from] PublishError),
}
