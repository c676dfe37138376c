//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Task store I/O failure. Retryable; no partial writes are left behind.
    Store(String),
    /// Task or reminder does not exist, or is not owned by the caller.
    NotFound(String),
    /// Unrecognized IANA time zone name.
    InvalidTimeZone(String),
    /// Reminder offset outside the accepted range.
    InvalidOffset(String),
    /// Malformed request input (empty title, unparseable datetime).
    Validation(String),
    /// Optimistic version check failed; the task changed underneath the caller.
    Conflict(String),
    /// Task cache backend failure. Never surfaced by the task service.
    Cache(String),
    /// Notification queue failure.
    Queue(String),
    /// Channel dispatcher failed or timed out.
    Dispatch(String),
    /// HTTP transport failure.
    Http(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Queue(_) | Self::Conflict(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Store(msg) => write!(f, "store: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::InvalidTimeZone(msg) => write!(f, "invalid time zone: {msg}"),
            Self::InvalidOffset(msg) => write!(f, "invalid offset: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Cache(msg) => write!(f, "cache: {msg}"),
            Self::Queue(msg) => write!(f, "queue: {msg}"),
            Self::Dispatch(msg) => write!(f, "dispatch: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}
