//! Error types for Todoist transport operations.

use reconcile::RemoteError;
use std::time::Duration;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to the Todoist API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Non-2xx response.
    #[error("http {status}{}", body_suffix(.body))]
    Http {
        /// HTTP status code.
        status: u16,
        /// Trimmed response body.
        body: String,
        /// Server-requested wait from `Retry-After`, when present.
        retry_after: Option<Duration>,
    },

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape.
    #[error("decode response: {0}")]
    Decode(String),

    /// Request body could not be encoded.
    #[error("encode request: {0}")]
    Encode(String),

    /// The run's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl Error {
    /// Create an HTTP status error.
    pub fn http(status: u16, body: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::Http {
            status,
            body: body.into().trim().to_string(),
            retry_after,
        }
    }

    /// Whether the request may be retried.
    ///
    /// Throttling and server-side failures are retried, as are transport
    /// errors. Everything else is returned to the caller immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Transport(_) => true,
            Self::Decode(_) | Self::Encode(_) | Self::DeadlineExceeded => false,
        }
    }

    /// Wait requested by the server before retrying.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::http(code, "", None),
            ureq::Error::Json(e) => Self::Decode(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<Error> for RemoteError {
    fn from(err: Error) -> Self {
        match err {
            Error::Http { status, body, .. } => Self::http(status, body),
            Error::Transport(message) => Self::Transport(message),
            Error::Decode(message) => Self::Decode(message),
            Error::Encode(message) => Self::Decode(format!("encode request: {message}")),
            Error::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_display() {
        assert_eq!(Error::http(404, "", None).to_string(), "http 404");
        assert_eq!(
            Error::http(400, "  bad args\n", None).to_string(),
            "http 400: bad args"
        );
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(Error::http(status, "", None).is_retryable(), "{status}");
        }
        for status in [400, 401, 403, 404, 410] {
            assert!(!Error::http(status, "", None).is_retryable(), "{status}");
        }
        assert!(Error::Transport("reset".into()).is_retryable());
        assert!(!Error::Decode("eof".into()).is_retryable());
        assert!(!Error::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn test_retry_after_only_on_http() {
        let err = Error::http(429, "", Some(Duration::from_secs(3)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(Error::Transport("x".into()).retry_after(), None);
    }

    #[test]
    fn test_into_remote_error() {
        let remote: RemoteError = Error::http(503, "busy", None).into();
        assert_eq!(remote, RemoteError::http(503, "busy"));
        assert!(remote.is_retryable());

        let remote: RemoteError = Error::DeadlineExceeded.into();
        assert_eq!(remote, RemoteError::DeadlineExceeded);
    }
}
