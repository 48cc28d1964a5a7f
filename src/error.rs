//! Error types for the scrape-and-record pipeline.
//!
//! Fetch and parse errors are per-item and end up as a recorded
//! `scrape_status`. Storage errors abort the current item only. Portfolio
//! and config errors are the only ones that fail a whole run.

use std::fmt;
use thiserror::Error;

/// Classification of a failed page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Network,
    Blocked,
    NotFound,
    Unknown,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Network => "network",
            FetchErrorKind::Blocked => "blocked",
            FetchErrorKind::NotFound => "not_found",
            FetchErrorKind::Unknown => "unknown",
        }
    }

    /// Blocks and missing listings do not get better by asking again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchErrorKind::Timeout | FetchErrorKind::Network | FetchErrorKind::Unknown
        )
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fetch {kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message)
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Blocked, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unknown, message)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The core price label is gone; the page no longer looks like a listing.
    #[error("layout_changed: {0}")]
    LayoutChanged(String),

    /// A secondary field could not be located. Reported, never fatal.
    #[error("field_missing: {0}")]
    FieldMissing(String),
}

/// Anything that can go wrong while turning one URL into parsed fields.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("write failed for {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("read failed for {path}: {reason}")]
    ReadFailed { path: String, reason: String },
}

impl StorageError {
    pub fn write(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        StorageError::WriteFailed {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn read(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        StorageError::ReadFailed {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("portfolio file {path} is unreadable: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("portfolio file {0} contains no trackable items")]
    Empty(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("config error: {0}")]
    Inconsistent(String),
}
