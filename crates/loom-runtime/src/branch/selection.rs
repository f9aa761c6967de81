//! Explicit branch choices.
//!
//! By default the newest child is active. Editing, retrying or appending
//! under an older message records an override so the branch the user just
//! acted on stays visible even when a newer sibling exists elsewhere.

use std::collections::{HashMap, HashSet};

use loom_core::ids::{MessageId, SessionId};
use loom_core::message::Message;
use parking_lot::RwLock;

use super::resolver::Tree;

/// Per-session map of parent → chosen child. `None` keys the root level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BranchSelection {
    choices: HashMap<Option<MessageId>, MessageId>,
}

impl BranchSelection {
    /// Pin `child` as the active child of `parent`.
    pub fn select(&mut self, parent: Option<MessageId>, child: MessageId) {
        let _ = self.choices.insert(parent, child);
    }

    /// Drop the override for `parent`.
    pub fn clear(&mut self, parent: Option<&MessageId>) {
        let _ = self.choices.remove(&parent.cloned());
    }

    /// Override for `parent`, if any.
    #[must_use]
    pub fn choice(&self, parent: Option<&MessageId>) -> Option<&MessageId> {
        self.choices.get(&parent.cloned())
    }

    /// Number of overrides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    /// Whether recency alone decides every level.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Make `target` lie on the active path.
    ///
    /// Walks from `target` to its root and, at every level, records an
    /// override unless the newest child already is the one on the way up.
    /// Returns `false` if `target` is not in `messages` or is not reachable
    /// from a root.
    pub fn activate(&mut self, messages: &[Message], target: &MessageId) -> bool {
        let tree = Tree::build(messages);
        let Some(mut node) = tree.get(target) else {
            return false;
        };

        let mut pending = Vec::new();
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(&node.id) {
                return false;
            }
            let parent = tree.parent_key(node);
            let newest = tree.default_child(parent);
            pending.push((parent, &node.id, newest.is_some_and(|n| n.id == node.id)));
            match parent.and_then(|p| tree.get(p)) {
                Some(up) => node = up,
                None => break,
            }
        }

        for (parent, child, is_default) in pending {
            if is_default {
                self.clear(parent);
            } else {
                self.select(parent.cloned(), child.clone());
            }
        }
        true
    }
}

/// Shared registry of [`BranchSelection`]s, one per session.
///
/// Choices live only in this process. They are not written through the
/// repository, so a new controller starts with none and every level falls
/// back to its newest child until the user activates a branch again.
#[derive(Debug, Default)]
pub struct BranchSelections {
    inner: RwLock<HashMap<SessionId, BranchSelection>>,
}

impl BranchSelections {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a session's choices.
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> BranchSelection {
        self.inner.read().get(session_id).cloned().unwrap_or_default()
    }

    /// Mutate a session's choices in place.
    pub fn update<R>(&self, session_id: &SessionId, f: impl FnOnce(&mut BranchSelection) -> R) -> R {
        let mut guard = self.inner.write();
        let entry = guard.entry(session_id.clone()).or_default();
        let out = f(entry);
        if entry.is_empty() {
            let _ = guard.remove(session_id);
        }
        out
    }

    /// Forget a session.
    pub fn remove(&self, session_id: &SessionId) {
        let _ = self.inner.write().remove(session_id);
    }

    /// Sessions with at least one override.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no session has an override.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::resolver::active_path;
    use chrono::{Duration, TimeZone, Utc};
    use loom_core::message::Role;

    fn msg(id: &str, parent: Option<&str>, at: i64) -> Message {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Message::new(SessionId::from("s"), parent.map(MessageId::from), Role::User, id)
            .with_id(id)
            .with_created_at(base + Duration::seconds(at))
    }

    fn ids(path: Vec<Message>) -> Vec<String> {
        path.into_iter().map(|m| m.id.into_inner()).collect()
    }

    fn tree() -> Vec<Message> {
        // a ── b ── c
        //   └─ b2 ── c2
        vec![
            msg("a", None, 0),
            msg("b", Some("a"), 1),
            msg("c", Some("b"), 2),
            msg("b2", Some("a"), 3),
            msg("c2", Some("b2"), 4),
        ]
    }

    #[test]
    fn activate_older_leaf_pins_its_ancestors() {
        let ms = tree();
        let mut sel = BranchSelection::default();
        assert!(sel.activate(&ms, &MessageId::from("c")));
        assert_eq!(ids(active_path(&ms, &sel)), ["a", "b", "c"]);
        assert_eq!(sel.len(), 1);
    }

    #[test]
    fn activate_newest_leaf_clears_overrides() {
        let ms = tree();
        let mut sel = BranchSelection::default();
        assert!(sel.activate(&ms, &MessageId::from("c")));
        assert!(sel.activate(&ms, &MessageId::from("c2")));
        assert!(sel.is_empty());
        assert_eq!(ids(active_path(&ms, &sel)), ["a", "b2", "c2"]);
    }

    #[test]
    fn activate_unknown_message() {
        let mut sel = BranchSelection::default();
        assert!(!sel.activate(&tree(), &MessageId::from("ghost")));
        assert!(sel.is_empty());
    }

    #[test]
    fn activate_inside_cycle_is_rejected() {
        let ms = vec![msg("x", Some("y"), 0), msg("y", Some("x"), 1)];
        let mut sel = BranchSelection::default();
        assert!(!sel.activate(&ms, &MessageId::from("x")));
    }

    #[test]
    fn registry_drops_empty_entries() {
        let reg = BranchSelections::new();
        let sid = SessionId::from("s");
        reg.update(&sid, |s| s.select(None, MessageId::from("a")));
        assert_eq!(reg.len(), 1);
        reg.update(&sid, |s| s.clear(None));
        assert!(reg.is_empty());
    }

    #[test]
    fn registry_get_returns_snapshot() {
        let reg = BranchSelections::new();
        let sid = SessionId::from("s");
        reg.update(&sid, |s| s.select(None, MessageId::from("a")));
        let snap = reg.get(&sid);
        reg.remove(&sid);
        assert_eq!(snap.choice(None).map(MessageId::as_str), Some("a"));
        assert!(reg.get(&sid).is_empty());
    }
}
