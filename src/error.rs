//! Error types for the feed client.
//!
//! Distinguishes transport failures (the push path may fall back to the
//! synchronous endpoint) from failures reported by the backend itself.

use thiserror::Error;

/// Error raised by the transport, the stream coordinator or the poller.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The backend answered with a non-success HTTP status.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Connection failed, was reset, or the body could not be read.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A response body could not be decoded.
    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The stream carried an explicit `error` event.
    #[error("stream reported an error: {0}")]
    Stream(String),

    /// The turn or poller was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,
}

impl FeedError {
    pub fn status(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }

    pub fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }

    /// Check whether this failure happened at the transport level.
    ///
    /// Transport failures make a push-path turn eligible for the
    /// synchronous fallback; cancellation never does.
    pub fn is_transport(&self) -> bool {
        matches!(self, FeedError::Status { .. } | FeedError::Network(_))
    }
}

pub type Result<T, E = FeedError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(FeedError::status("/chat/stream", 502, "bad gateway").is_transport());
        assert!(!FeedError::Stream("boom".to_string()).is_transport());
        assert!(!FeedError::Cancelled.is_transport());
    }

    #[test]
    fn test_status_display() {
        let err = FeedError::status("/tasks/abc", 404, "Task not found");
        assert_eq!(err.to_string(), "HTTP 404 from /tasks/abc: Task not found");
    }
}
