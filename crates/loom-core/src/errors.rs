//! Error hierarchy for Loom.
//!
//! - [`LoomError`]: top-level enum returned by controller operations
//! - [`ValidationError`]: a request was rejected before any write
//! - [`PersistenceError`]: the repository failed, with table and operation context
//! - [`ProviderError`]: the summarization provider failed (never returned to
//!   interactive callers; surfaces as a `CompactionFailed` event)

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{MessageId, ProjectId, SessionId};

/// Convenience alias used across Loom crates.
pub type Result<T, E = LoomError> = std::result::Result<T, E>;

// ─────────────────────────────────────────────────────────────────────────────
// LoomError
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type.
#[derive(Debug, Error)]
pub enum LoomError {
    /// The request was rejected before touching the store.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The store failed; the mutation was abandoned.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// The summarization provider failed.
    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl LoomError {
    /// Short classification string for logging and metrics labels.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_kind(),
            Self::Persistence(_) => "persistence",
            Self::Provider(e) => e.error_kind(),
        }
    }

    /// Whether this is a [`ValidationError`].
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ValidationError
// ─────────────────────────────────────────────────────────────────────────────

/// A request that cannot be applied to the current state.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No message with this id.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// No session with this id.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// No project with this id.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// The requested parent does not exist.
    #[error("parent message not found: {0}")]
    ParentNotFound(MessageId),

    /// The requested parent belongs to another session.
    #[error("parent message {parent_id} belongs to session {actual}, not {expected}")]
    ParentSessionMismatch {
        /// Parent that was named.
        parent_id: MessageId,
        /// Session the caller targeted.
        expected: SessionId,
        /// Session the parent actually lives in.
        actual: SessionId,
    },

    /// Retry was requested for a message that did not fail.
    #[error("message {0} is not marked failed")]
    NotFailed(MessageId),

    /// The session is archived or deleted and rejects mutations.
    #[error("session {session_id} is {status} and cannot be modified")]
    SessionClosed {
        /// Session that was targeted.
        session_id: SessionId,
        /// Its current status (`archived` / `deleted`).
        status: String,
    },

    /// The message sits on a parent cycle and cannot be made active.
    #[error("message {0} is not reachable from a root")]
    Unreachable(MessageId),

    /// Message content or a name was empty.
    #[error("{0} must not be empty")]
    EmptyContent(&'static str),
}

impl ValidationError {
    /// Short classification string.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MessageNotFound(_) => "message_not_found",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::ParentNotFound(_) => "parent_not_found",
            Self::ParentSessionMismatch { .. } => "parent_session_mismatch",
            Self::NotFailed(_) => "not_failed",
            Self::SessionClosed { .. } => "session_closed",
            Self::Unreachable(_) => "unreachable",
            Self::EmptyContent(_) => "empty_content",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PersistenceError
// ─────────────────────────────────────────────────────────────────────────────

/// Store operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceOperation {
    /// Reading from the store.
    Read,
    /// Writing to the store.
    Write,
    /// Deleting from the store.
    Delete,
}

impl fmt::Display for PersistenceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Repository failure.
#[derive(Debug, Error)]
#[error("persistence {operation} failed on {table}: {message}")]
pub struct PersistenceError {
    /// Table or collection that failed.
    pub table: String,
    /// Operation that failed.
    pub operation: PersistenceOperation,
    /// Human-readable message.
    pub message: String,
    /// Original cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PersistenceError {
    /// Create a new persistence error.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        operation: PersistenceOperation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            operation,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProviderError
// ─────────────────────────────────────────────────────────────────────────────

/// Summarization provider failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider returned an error.
    #[error("summary call failed: {message}")]
    CallFailed {
        /// Provider-supplied message.
        message: String,
    },

    /// The provider did not answer in time.
    #[error("summary call timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The provider answered with an empty summary.
    #[error("summary call returned an empty summary")]
    EmptySummary,
}

impl ProviderError {
    /// Build a [`ProviderError::CallFailed`].
    #[must_use]
    pub fn call_failed(message: impl Into<String>) -> Self {
        Self::CallFailed {
            message: message.into(),
        }
    }

    /// Short classification string.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::CallFailed { .. } => "provider_call_failed",
            Self::Timeout { .. } => "provider_timeout",
            Self::EmptySummary => "provider_empty_summary",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
