//! Event value objects.
//!
//! [`EventKind`] is generated by the `bus_events!` macro so that the type
//! string and the target [`Stream`] of every variant are declared next to
//! its fields. Routing is a static property of the kind; publishers never
//! choose a stream.

use std::fmt;

use chrono::{DateTime, Utc};
use loom_core::ids::{MessageId, ProjectId, SessionId};
use serde::{Deserialize, Serialize};

/// One of the two logical bus streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    /// Developer and system diagnostics, refresh signals.
    Internal,
    /// End-user notifications.
    User,
}

impl Stream {
    /// Both streams.
    pub const ALL: [Self; 2] = [Self::Internal, Self::User];

    /// Lowercase name, also used as a metrics label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who caused an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// The engine itself (background work, lifecycle).
    System,
    /// A direct user action.
    User,
    /// Another internal component.
    Internal,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Internal => "internal",
        })
    }
}

macro_rules! bus_events {
    ($(
        $(#[doc = $doc:literal])*
        $variant:ident {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ty
            ),*
            $(,)?
        } => $rename:literal on $stream:ident
    ),* $(,)?) => {
        /// Tagged event payload.
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type", rename_all_fields = "camelCase")]
        #[allow(missing_docs)]
        pub enum EventKind {
            $(
                $(#[doc = $doc])*
                #[serde(rename = $rename)]
                $variant {
                    $(
                        $(#[$fmeta])*
                        $field: $ty,
                    )*
                },
            )*
        }

        impl EventKind {
            /// Type string (the serialized `type` tag).
            #[must_use]
            pub fn event_type(&self) -> &'static str {
                match self {
                    $(Self::$variant { .. } => $rename,)*
                }
            }

            /// Stream this kind is always published on.
            #[must_use]
            pub fn stream(&self) -> Stream {
                match self {
                    $(Self::$variant { .. } => Stream::$stream,)*
                }
            }
        }

        /// Number of `EventKind` variants.
        #[cfg(test)]
        pub(crate) const VARIANT_COUNT: usize = [$($rename),*].len();
    };
}

bus_events! {
    // -- Refresh signals --

    /// The session list changed (attributes or lifecycle).
    SessionsRefresh {} => "sessions_refresh" on Internal,

    /// A session's message history changed.
    SessionUpdated {
        session_id: SessionId,
    } => "session_updated" on Internal,

    /// The project list changed.
    ProjectsRefresh {} => "projects_refresh" on Internal,

    /// A session moved into, out of, or between projects.
    ProjectUpdated {
        session_id: SessionId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        project_id: Option<ProjectId>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        previous_project_id: Option<ProjectId>,
    } => "project_updated" on Internal,

    // -- Diagnostics --

    /// The active model changed.
    ModelChanged {
        model: String,
    } => "model_changed" on Internal,

    /// Background indexing began.
    IndexingStarted {
        target: String,
    } => "indexing_started" on Internal,

    /// Background indexing finished.
    IndexingCompleted {
        target: String,
        items: usize,
    } => "indexing_completed" on Internal,

    /// Background indexing failed.
    IndexingFailed {
        target: String,
        error: String,
    } => "indexing_failed" on Internal,

    /// Older messages were folded into the session summary.
    CompactionCompleted {
        session_id: SessionId,
        folded_count: usize,
        last_compacted_message_id: MessageId,
        compaction_count: u32,
    } => "compaction_completed" on Internal,

    /// A compaction attempt was abandoned; nothing was committed.
    CompactionFailed {
        session_id: SessionId,
        error: String,
    } => "compaction_failed" on Internal,

    // -- User-facing --

    /// An assistant response finished.
    ResponseCompleted {
        session_id: SessionId,
        message_id: MessageId,
    } => "response_completed" on User,

    /// An assistant response failed.
    ResponseFailed {
        session_id: SessionId,
        message_id: MessageId,
        error: String,
    } => "response_failed" on User,

    /// Free-form notice for the user.
    Notice {
        message: String,
    } => "notice" on User,
}

impl EventKind {
    /// Human-readable one-line rendering.
    #[must_use]
    pub fn details(&self) -> String {
        match self {
            Self::SessionsRefresh {} => "Sessions refreshed".to_string(),
            Self::SessionUpdated { session_id } => format!("Session {session_id} updated"),
            Self::ProjectsRefresh {} => "Projects refreshed".to_string(),
            Self::ProjectUpdated {
                session_id,
                project_id: Some(project_id),
                ..
            } => format!("Session {session_id} moved to project {project_id}"),
            Self::ProjectUpdated { session_id, .. } => {
                format!("Session {session_id} removed from its project")
            }
            Self::ModelChanged { model } => format!("Model changed to {model}"),
            Self::IndexingStarted { target } => format!("Indexing {target}"),
            Self::IndexingCompleted { target, items } => {
                format!("Indexed {target} ({items} items)")
            }
            Self::IndexingFailed { target, error } => {
                format!("Indexing {target} failed: {error}")
            }
            Self::CompactionCompleted {
                session_id,
                folded_count,
                compaction_count,
                ..
            } => format!(
                "Compacted {folded_count} messages in session {session_id} (#{compaction_count})"
            ),
            Self::CompactionFailed { session_id, error } => {
                format!("Compaction failed for session {session_id}: {error}")
            }
            Self::ResponseCompleted {
                session_id,
                message_id,
            } => format!("Response {message_id} completed in session {session_id}"),
            Self::ResponseFailed {
                session_id,
                message_id,
                error,
            } => format!("Response {message_id} failed in session {session_id}: {error}"),
            Self::Notice { message } => message.clone(),
        }
    }

    /// Session this event concerns, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::SessionUpdated { session_id }
            | Self::ProjectUpdated { session_id, .. }
            | Self::CompactionCompleted { session_id, .. }
            | Self::CompactionFailed { session_id, .. }
            | Self::ResponseCompleted { session_id, .. }
            | Self::ResponseFailed { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// A published event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Who caused it.
    pub source: EventSource,
    /// When it was created.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub kind: EventKind,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(source: EventSource, kind: EventKind) -> Self {
        Self {
            source,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Event caused by the engine.
    #[must_use]
    pub fn system(kind: EventKind) -> Self {
        Self::new(EventSource::System, kind)
    }

    /// Event caused by a user action.
    #[must_use]
    pub fn user(kind: EventKind) -> Self {
        Self::new(EventSource::User, kind)
    }

    /// Event caused by another component.
    #[must_use]
    pub fn internal(kind: EventKind) -> Self {
        Self::new(EventSource::Internal, kind)
    }

    /// Stream this event routes to.
    #[must_use]
    pub fn stream(&self) -> Stream {
        self.kind.stream()
    }

    /// Type string of the payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Human-readable one-line rendering.
    #[must_use]
    pub fn details(&self) -> String {
        self.kind.details()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.source,
            self.details()
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
