//! Custom error types for altbot.
//!
//! The taxonomy mirrors how failures are handled: transport problems abort
//! the current use case, accessibility and conflict problems are recovered
//! at the loop boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for altbot operations.
#[derive(Error, Debug)]
pub enum BotError {
    // =========================================================================
    // Remote API Errors
    // =========================================================================
    /// The remote API is unreachable or credentials were rejected.
    /// Fatal to the current use case.
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    /// A protected, blocking, or deleted account/tweet. Recovered locally
    /// by skipping the subject, optionally after a follow attempt.
    #[error("{subject} is not accessible: {reason}")]
    NotAccessible { subject: String, reason: String },

    /// The recipient cannot be DMed: not following, blocked, or DMs closed.
    /// An expected outcome, not a failure; the dispatcher converts it to
    /// [`crate::model::DmOutcome::Refused`].
    #[error("Recipient {user_id} does not accept direct messages")]
    DmRefused { user_id: i64 },

    /// The remote API rejected a request with a non-transport error.
    #[error("API error: {0}")]
    Api(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Duplicate primary key on write. Recovered locally: either ignored
    /// (idempotent paths) or aborts just the offending row.
    #[error("Conflict: {entity} '{key}' already exists")]
    Conflict { entity: &'static str, key: String },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{}': {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped anyhow error for the binary boundary.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for altbot operations.
pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    /// Create a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a not-accessible error.
    pub fn not_accessible(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotAccessible {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(entity: &'static str, key: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            key: key.into(),
        }
    }

    /// Whether this error is a duplicate-key conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether this error must abort the whole use case (as opposed to the
    /// current account/tweet only).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Config { .. })
    }
}

/// Map a rusqlite failure to `Conflict` when it is a constraint violation,
/// passing everything else through as `Database`.
pub fn map_constraint(err: rusqlite::Error, entity: &'static str, key: &str) -> BotError {
    match &err {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            BotError::conflict(entity, key.to_string())
        }
        _ => BotError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_fatal() {
        assert!(BotError::transport("connection refused").is_fatal());
        assert!(!BotError::conflict("tweet", "123").is_fatal());
    }

    #[test]
    fn conflict_display_names_entity_and_key() {
        let err = BotError::conflict("tweet", "42");
        assert!(err.to_string().contains("tweet"));
        assert!(err.to_string().contains("42"));
        assert!(err.is_conflict());
    }

    #[test]
    fn constraint_violation_maps_to_conflict() {
        let sqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed".into()),
        );
        let err = map_constraint(sqlite_err, "tweet", "99");
        assert!(err.is_conflict());
    }

    #[test]
    fn other_sqlite_errors_pass_through() {
        let err = map_constraint(rusqlite::Error::InvalidQuery, "tweet", "99");
        assert!(matches!(err, BotError::Database(_)));
    }
}
