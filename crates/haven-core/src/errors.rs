use std::time::Duration;

/// Typed error hierarchy for the chat client.
/// Classifies errors as fatal (don't retry), retryable, or operational.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    // Fatal, not worth retrying
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Local preconditions; the caller must change state first
    #[error("not connected")]
    NotConnected,
    #[error("session inactive: {0}")]
    SessionInactive(String),
    #[error("a reply is already in flight for this conversation")]
    ReplyInFlight,

    // Retryable
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    // Operational
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::ServerError { .. }
                | Self::NetworkError(_)
                | Self::StreamInterrupted(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_) | Self::InvalidRequest(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotConnected => "not_connected",
            Self::SessionInactive(_) => "session_inactive",
            Self::ReplyInFlight => "reply_in_flight",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 | 422 => Self::InvalidRequest(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ClientError::ConnectionFailed("refused".into()).is_retryable());
        assert!(ClientError::ServerError { status: 500, body: "err".into() }.is_retryable());
        assert!(ClientError::NetworkError("tcp".into()).is_retryable());
        assert!(ClientError::StreamInterrupted("eof".into()).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(ClientError::AuthenticationFailed("bad token".into()).is_fatal());
        assert!(ClientError::InvalidRequest("bad".into()).is_fatal());
    }

    #[test]
    fn local_preconditions_neither_retryable_nor_fatal() {
        for err in [
            ClientError::NotConnected,
            ClientError::SessionInactive("expired".into()),
            ClientError::ReplyInFlight,
        ] {
            assert!(!err.is_retryable(), "{err}");
            assert!(!err.is_fatal(), "{err}");
        }
    }

    #[test]
    fn from_status_mapping() {
        assert!(ClientError::from_status(401, "unauthorized".into()).is_fatal());
        assert!(ClientError::from_status(403, "forbidden".into()).is_fatal());
        assert!(ClientError::from_status(404, "no such session".into()).is_fatal());
        assert!(ClientError::from_status(500, "internal".into()).is_retryable());
        assert!(ClientError::from_status(502, "bad gateway".into()).is_retryable());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ClientError::Cancelled.error_kind(), "cancelled");
        assert_eq!(ClientError::ReplyInFlight.error_kind(), "reply_in_flight");
        assert_eq!(
            ClientError::SessionInactive("idle".into()).error_kind(),
            "session_inactive"
        );
    }
}
