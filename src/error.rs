//! Error Taxonomy
//!
//! Canonical error kinds surfaced to callers, plus the HTTP/gRPC status
//! mapping used internally by the request pipeline and the event stream.

use reqwest::header::HeaderMap;
use thiserror::Error as ThisError;

/// Public error kind. Every error the pipeline or the stream ever returns to
/// a caller carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum ErrorKind {
    #[error("server unavailable")]
    ServerUnavailable,
    #[error("server error")]
    ServerError,
    #[error("bad request")]
    BadRequest,
    #[error("unauthorized")]
    Unauthorized,
    #[error("insufficient permissions")]
    InsufficientPermissions,
    #[error("not found")]
    NotFound,
    #[error("resource already exists")]
    ResourceAlreadyExists,
    #[error("unknown error")]
    UnknownError,
    #[error("logged out")]
    LoggedOut,
}

/// An error returned by the pipeline, the authenticator, or the event
/// stream's `onError` callback.
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub help_url: Option<String>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(m) = &self.message {
            write!(f, ": {m}")?;
        }
        if let Some(h) = &self.help_url {
            write!(f, " ({h})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            help_url: None,
        }
    }

    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            help_url: None,
        }
    }

    pub fn with_details(
        kind: ErrorKind,
        message: Option<String>,
        help_url: Option<String>,
    ) -> Self {
        Self {
            kind,
            message,
            help_url,
        }
    }

    pub fn server_unavailable(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::ServerUnavailable, message)
    }

    pub fn unknown_error(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::UnknownError, message)
    }

    pub fn logged_out() -> Self {
        Self::new(ErrorKind::LoggedOut)
    }
}

/// Unary-response error body: `{ "error": string, "code": integer, "help": string }`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
    #[allow(dead_code)]
    pub code: Option<i64>,
    pub help: Option<String>,
}

/// Outcome of classifying one HTTP status for the unary pipeline.
pub(crate) enum StatusOutcome {
    /// Status is in `[200, 300)`.
    Success,
    /// Status is `429`; caller should sleep `retry_after` seconds then resend.
    TooManyRequests { retry_after: u64 },
    /// Status mapped to a public error kind.
    Mapped(ErrorKind),
    /// Any other non-2xx status.
    Unknown,
}

/// Map an HTTP status code per §4.A, collapsing internal kinds
/// (forbidden/conflict/5xx family) down to their public equivalents.
pub(crate) fn classify_status(status: u16, headers: &HeaderMap) -> StatusOutcome {
    match status {
        200..=299 => StatusOutcome::Success,
        400 => StatusOutcome::Mapped(ErrorKind::BadRequest),
        401 => StatusOutcome::Mapped(ErrorKind::Unauthorized),
        403 => StatusOutcome::Mapped(ErrorKind::InsufficientPermissions),
        404 => StatusOutcome::Mapped(ErrorKind::NotFound),
        409 => StatusOutcome::Mapped(ErrorKind::ResourceAlreadyExists),
        429 => StatusOutcome::TooManyRequests {
            retry_after: parse_retry_after(headers),
        },
        500 | 503 | 504 => StatusOutcome::Mapped(ErrorKind::ServerError),
        _ => StatusOutcome::Unknown,
    }
}

/// Parse the `Retry-After` header as whole seconds, defaulting to 5 when
/// absent or unparsable.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(5)
}

/// Outcome of mapping a stream-error envelope's `code` per the dual
/// HTTP/gRPC table in §4.G.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamCodeOutcome {
    Mapped(ErrorKind),
    /// Session timeout: not an error, the stream will restart on its own.
    SessionTimeout,
}

pub(crate) fn map_stream_error_code(code: i64) -> StreamCodeOutcome {
    match code {
        3 | 9 | 11 | 400 => StreamCodeOutcome::Mapped(ErrorKind::BadRequest),
        16 | 401 => StreamCodeOutcome::Mapped(ErrorKind::Unauthorized),
        7 | 403 => StreamCodeOutcome::Mapped(ErrorKind::InsufficientPermissions),
        5 | 404 => StreamCodeOutcome::Mapped(ErrorKind::NotFound),
        2 | 13 | 15 | 500 | 14 | 503 => StreamCodeOutcome::Mapped(ErrorKind::ServerError),
        1 | 4 | 504 => StreamCodeOutcome::SessionTimeout,
        _ => StreamCodeOutcome::Mapped(ErrorKind::UnknownError),
    }
}
