//! Normalized error taxonomy for orchestrated requests.
//!
//! Every failure that reaches a caller is one of the variants below — raw
//! transport errors never cross the client boundary. Because a single
//! in-flight request can settle many merged waiters, `Error` is `Clone`;
//! non-cloneable underlying errors are held behind `Arc` and remain
//! reachable through [`std::error::Error::source`].

use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// Coarse classification of a normalized error.
///
/// This is what callers should branch on when deciding user-visible
/// behavior; the variant payloads on [`Error`] carry the diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection-level failure: no response was received.
    Network,
    /// The deadline elapsed before the transport settled.
    Timeout,
    /// The request was cancelled before it settled.
    Cancelled,
    /// The server responded with a 5xx status.
    Server,
    /// The server responded with a 4xx status.
    Client,
    /// The response arrived but the business envelope signaled failure.
    Business,
    /// Anything that does not fit the categories above.
    Unknown,
}

/// The error type produced by the request pipeline.
///
/// # Examples
///
/// ```no_run
/// use coalesce::{Client, Error, ErrorKind};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.get::<serde_json::Value>("/endpoint").await {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(e) if e.kind() == ErrorKind::Business => {
///         eprintln!("Backend rejected the request: {}", e);
///     }
///     Err(e) => eprintln!("{:?}: {}", e.kind(), e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A connection-level error occurred and no response was received.
    ///
    /// The cause is type-erased so any [`crate::Transport`] implementation
    /// can surface its own connection failures, not just the reqwest one.
    #[error("network error: {message}")]
    Network {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying transport error.
        #[source]
        cause: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The request did not settle within its deadline.
    ///
    /// Raised both when the transport reports its own timeout and when the
    /// orchestrator's racing timer wins; in the latter case there is no
    /// underlying error object, so the message names the deadline instead.
    #[error("request timed out: {message}")]
    Timeout {
        /// Description of which deadline elapsed.
        message: String,
    },

    /// The request was cancelled via [`crate::Client::cancel`] or
    /// [`crate::Client::cancel_all`], or its caller gave up before it settled.
    #[error("request cancelled")]
    Cancelled,

    /// The server responded with a 5xx status.
    #[error("server error {status}: {raw_response}")]
    Server {
        /// The HTTP status code.
        status: StatusCode,
        /// The raw response body.
        raw_response: String,
        /// Parsed `Retry-After` hint, when the server provided one.
        retry_after: Option<Duration>,
    },

    /// The server responded with a 4xx status.
    ///
    /// 408 and 429 are still classified here but count as transient for
    /// retry purposes; see [`Error::is_transient`].
    #[error("client error {status}: {raw_response}")]
    Client {
        /// The HTTP status code.
        status: StatusCode,
        /// The raw response body.
        raw_response: String,
        /// Parsed `Retry-After` hint (populated for 429 responses).
        retry_after: Option<Duration>,
    },

    /// The response envelope signaled an application-level failure.
    ///
    /// Business errors are never retried.
    #[error("business error {code}: {message}")]
    Business {
        /// The application error code from the envelope.
        code: i64,
        /// The message from the envelope.
        message: String,
    },

    /// The response body could not be decoded into the expected shape.
    ///
    /// Preserves the raw body so decode failures can be diagnosed in
    /// production.
    #[error("failed to decode response (status {status}): {serde_error}")]
    Decode {
        /// The raw response body that failed to decode.
        raw_response: String,
        /// The serde error message.
        serde_error: String,
        /// The HTTP status code of the response.
        status: StatusCode,
    },

    /// A response arrived with a status outside every category above
    /// (for example an unfollowed redirect).
    #[error("unexpected response status {status}")]
    Unexpected {
        /// The HTTP status code.
        status: StatusCode,
    },

    /// Invalid client or request configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("invalid URL: {cause}")]
    InvalidUrl {
        /// The underlying parse error.
        #[source]
        cause: Arc<url::ParseError>,
    },
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl { cause: Arc::new(e) }
    }
}

impl Error {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network { .. } => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Server { .. } => ErrorKind::Server,
            Error::Client { .. } => ErrorKind::Client,
            Error::Business { .. } => ErrorKind::Business,
            Error::Decode { .. }
            | Error::Unexpected { .. }
            | Error::Configuration(_)
            | Error::InvalidUrl { .. } => ErrorKind::Unknown,
        }
    }

    /// Returns `true` if this error is transient and worth retrying.
    ///
    /// Transient errors are network failures, timeouts, 5xx responses, and
    /// the two retryable client statuses (408 Request Timeout and 429 Too
    /// Many Requests). Business errors and other 4xx responses are final.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network { .. } | Error::Timeout { .. } | Error::Server { .. } => true,
            Error::Client { status, .. } => status.as_u16() == 408 || status.as_u16() == 429,
            _ => false,
        }
    }

    /// Returns the HTTP status code if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Server { status, .. }
            | Error::Client { status, .. }
            | Error::Decode { status, .. }
            | Error::Unexpected { status } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error carries one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Server { raw_response, .. }
            | Error::Client { raw_response, .. }
            | Error::Decode { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the server's `Retry-After` hint, if one was parsed.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Server { retry_after, .. } | Error::Client { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A specialized `Result` type for orchestrated requests.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn client_error(status: u16) -> Error {
        Error::Client {
            status: StatusCode::from_u16(status).unwrap(),
            raw_response: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            Error::Timeout {
                message: "deadline".into()
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            Error::Server {
                status: StatusCode::BAD_GATEWAY,
                raw_response: String::new(),
                retry_after: None,
            }
            .kind(),
            ErrorKind::Server
        );
        assert_eq!(client_error(404).kind(), ErrorKind::Client);
        assert_eq!(
            Error::Business {
                code: 1001,
                message: "insufficient balance".into()
            }
            .kind(),
            ErrorKind::Business
        );
        assert_eq!(
            Error::Configuration("bad".into()).kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_transient_statuses() {
        assert!(client_error(408).is_transient());
        assert!(client_error(429).is_transient());
        assert!(!client_error(400).is_transient());
        assert!(!client_error(404).is_transient());

        let server = Error::Server {
            status: StatusCode::SERVICE_UNAVAILABLE,
            raw_response: String::new(),
            retry_after: None,
        };
        assert!(server.is_transient());
    }

    #[test]
    fn test_business_errors_are_final() {
        let err = Error::Business {
            code: 5001,
            message: "rejected".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_network_cause_is_type_erased() {
        let err = Error::Network {
            message: "connection reset".into(),
            cause: Arc::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            )),
        };
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.is_transient());

        let source = std::error::Error::source(&err).expect("cause is attached");
        assert!(source.to_string().contains("reset by peer"));
    }

    #[test]
    fn test_retry_after_accessor() {
        let err = Error::Client {
            status: StatusCode::TOO_MANY_REQUESTS,
            raw_response: String::new(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(Error::Cancelled.retry_after(), None);
    }
}
