//! Error types
//!
//! [`GatewayError`] is what a backend call can fail with. [`ChatError`] is what
//! the controller reports to the presentation layer; every variant leaves the
//! controller in a valid, previously reachable state.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Transport-kind failure of a gateway call
///
/// Any failure means the operation did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum GatewayError {
    /// Could not reach the gateway at all
    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    /// Gateway answered with a non-2xx status
    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the declared shape
    #[error("malformed gateway payload: {0}")]
    Malformed(String),

    /// Incremental reply broke before its completion marker
    #[error("reply stream broken: {0}")]
    StreamBroken(String),

    /// Request or reply exceeded its time budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn stream_broken(msg: impl Into<String>) -> Self {
        Self::StreamBroken(msg.into())
    }

    /// Error category for logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "unreachable",
            Self::Status { .. } => "status",
            Self::Malformed(_) => "malformed",
            Self::StreamBroken(_) => "stream_broken",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Failure reported at the controller boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ChatError {
    /// Thread creation rejected; the draft and the typed text are kept
    #[error("could not start conversation: {0}")]
    CreationFailure(GatewayError),

    /// Send or stream failed on an existing thread; streamed text is rolled back
    #[error("could not send message: {0}")]
    SendFailure(GatewayError),

    /// Listing threads or messages failed; cached data stays displayed
    #[error("could not load conversations: {0}")]
    FetchFailure(GatewayError),

    /// Thread deletion rejected; selection is unchanged
    #[error("could not delete conversation: {0}")]
    DeleteFailure(GatewayError),

    /// Another reply is still streaming
    #[error("a reply is still in progress")]
    Busy,

    /// Input was empty after trimming
    #[error("message is empty")]
    EmptyMessage,
}

/// Discriminant of [`ChatError`] for callers that branch on kind only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatErrorKind {
    Creation,
    Send,
    Fetch,
    Delete,
    Busy,
    EmptyMessage,
}

/// Result type for controller operations
pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    pub fn kind(&self) -> ChatErrorKind {
        match self {
            Self::CreationFailure(_) => ChatErrorKind::Creation,
            Self::SendFailure(_) => ChatErrorKind::Send,
            Self::FetchFailure(_) => ChatErrorKind::Fetch,
            Self::DeleteFailure(_) => ChatErrorKind::Delete,
            Self::Busy => ChatErrorKind::Busy,
            Self::EmptyMessage => ChatErrorKind::EmptyMessage,
        }
    }

    /// Underlying gateway error, if the failure came from the backend
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            Self::CreationFailure(e)
            | Self::SendFailure(e)
            | Self::FetchFailure(e)
            | Self::DeleteFailure(e) => Some(e),
            Self::Busy | Self::EmptyMessage => None,
        }
    }

    /// Rejected before any backend call was made
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Busy | Self::EmptyMessage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_category() {
        assert_eq!(GatewayError::unreachable("dns").category(), "unreachable");
        assert_eq!(GatewayError::status(502, "bad gateway").category(), "status");
        assert_eq!(
            GatewayError::Timeout(Duration::from_secs(3)).category(),
            "timeout"
        );
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::status(503, "maintenance");
        assert_eq!(err.to_string(), "gateway returned status 503: maintenance");

        let err = GatewayError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "timed out after 5s");
    }

    #[test]
    fn test_chat_error_kind_and_source() {
        let err = ChatError::SendFailure(GatewayError::stream_broken("reset"));
        assert_eq!(err.kind(), ChatErrorKind::Send);
        assert_eq!(
            err.gateway_error(),
            Some(&GatewayError::StreamBroken("reset".to_string()))
        );
        assert!(!err.is_rejection());

        assert!(ChatError::Busy.is_rejection());
        assert!(ChatError::EmptyMessage.gateway_error().is_none());
    }

    #[test]
    fn test_chat_error_display_wraps_gateway_error() {
        let err = ChatError::CreationFailure(GatewayError::unreachable("connection refused"));
        assert_eq!(
            err.to_string(),
            "could not start conversation: gateway unreachable: connection refused"
        );
    }
}
