//! Session and project records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ProjectId, SessionId};

/// Lifecycle state of a session.
///
/// `Created → Active → Archived | Deleted`; `Archived` may return to
/// `Active`. Stars and project membership are attributes, not states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Row exists but the first message has not landed yet.
    #[default]
    Created,
    /// Normal state.
    Active,
    /// Hidden from the main list, read-only.
    Archived,
    /// Soft-deleted.
    Deleted,
}

impl SessionStatus {
    /// Whether mutations are rejected in this state.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Archived | Self::Deleted)
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session ID.
    pub id: SessionId,
    /// Display title, derived from the first message unless renamed.
    pub title: String,
    /// Owning project, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// Starred in the sidebar.
    #[serde(default)]
    pub starred: bool,
    /// Lifecycle state.
    #[serde(default)]
    pub status: SessionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session in the `Created` state.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            title: title.into(),
            project_id: None,
            starred: false,
            status: SessionStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<SessionId>) -> Self {
        self.id = id.into();
        self
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A named group of sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique project ID.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Create a project with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_states() {
        assert!(!SessionStatus::Created.is_closed());
        assert!(!SessionStatus::Active.is_closed());
        assert!(SessionStatus::Archived.is_closed());
        assert!(SessionStatus::Deleted.is_closed());
    }

    #[test]
    fn new_session_is_created_and_unstarred() {
        let s = Session::new("Trip");
        assert_eq!(s.status, SessionStatus::Created);
        assert!(!s.starred);
        assert!(s.project_id.is_none());
        assert_eq!(s.created_at, s.updated_at);
    }

    #[test]
    fn touch_moves_updated_at_forward() {
        let mut s = Session::new("t");
        let before = s.updated_at;
        s.touch();
        assert!(s.updated_at >= before);
    }

    #[test]
    fn session_serde_shape() {
        let s = Session::new("t").with_id("s1");
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["id"], "s1");
        assert_eq!(v["status"], "created");
        assert!(v.get("projectId").is_none());
        assert!(v.get("createdAt").is_some());
    }

    #[test]
    fn status_display() {
        assert_eq!(SessionStatus::Archived.to_string(), "archived");
    }
}
