//! Active/outdated partition of a session's message tree.
//!
//! The resolver is a pure function over a session's full message set. It
//! rebuilds a parent → children index on every call, walks the active path
//! from the root, and emits the siblings it passes over as outdated
//! branches. Nothing is cached and nothing is stored on the messages.
//!
//! Activity rules:
//! - the child with the greatest `created_at` is active, ties broken by id
//! - a [`BranchSelection`] entry for a node overrides that choice, but only
//!   if it names one of the node's actual children
//! - several roots are siblings under a virtual root
//! - a message whose parent is absent from the input is a root
//! - messages unreachable from any root (parent cycles) are dropped

use std::collections::{HashMap, HashSet};

use loom_core::ids::MessageId;
use loom_core::message::Message;
use serde::{Deserialize, Serialize};

use super::selection::BranchSelection;

/// One element of a resolved conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// A message on the active path.
    ActiveMessage(Message),
    /// A non-active subtree in depth-first pre-order. Never empty.
    OutdatedBranch(Vec<Message>),
}

impl Segment {
    /// Whether this is an active message.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::ActiveMessage(_))
    }

    /// Messages carried by this segment.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        match self {
            Self::ActiveMessage(m) => std::slice::from_ref(m),
            Self::OutdatedBranch(ms) => ms,
        }
    }
}

/// Parent → children index over a borrowed message set.
pub(crate) struct Tree<'a> {
    by_id: HashMap<&'a MessageId, &'a Message>,
    /// Children sorted oldest first. `None` is the virtual root.
    children: HashMap<Option<&'a MessageId>, Vec<&'a Message>>,
}

impl<'a> Tree<'a> {
    pub(crate) fn build(messages: &'a [Message]) -> Self {
        let by_id: HashMap<&MessageId, &Message> = messages.iter().map(|m| (&m.id, m)).collect();
        let mut children: HashMap<Option<&MessageId>, Vec<&Message>> = HashMap::new();
        for &m in by_id.values() {
            let key = Self::key_for(&by_id, m);
            children.entry(key).or_default().push(m);
        }
        for kids in children.values_mut() {
            kids.sort_by(|a, b| a.recency_key().cmp(&b.recency_key()));
        }
        Self { by_id, children }
    }

    fn key_for(
        by_id: &HashMap<&'a MessageId, &'a Message>,
        m: &'a Message,
    ) -> Option<&'a MessageId> {
        m.parent_id
            .as_ref()
            .and_then(|p| by_id.get_key_value(p).map(|(k, _)| *k))
    }

    pub(crate) fn get(&self, id: &MessageId) -> Option<&'a Message> {
        self.by_id.get(id).copied()
    }

    /// Parent key of a message inside this tree (`None` for roots).
    pub(crate) fn parent_key(&self, m: &'a Message) -> Option<&'a MessageId> {
        Self::key_for(&self.by_id, m)
    }

    fn children_of<'b>(&'b self, parent: Option<&'b MessageId>) -> &'b [&'a Message] {
        self.children.get(&parent).map_or(&[], Vec::as_slice)
    }

    /// Most recent child, ignoring overrides.
    pub(crate) fn default_child(&self, parent: Option<&MessageId>) -> Option<&'a Message> {
        self.children_of(parent).last().copied()
    }

    /// Active child after applying `selection`.
    fn active_child(
        &self,
        parent: Option<&MessageId>,
        selection: &BranchSelection,
    ) -> Option<&'a Message> {
        let kids = self.children_of(parent);
        selection
            .choice(parent)
            .and_then(|chosen| kids.iter().find(|k| &k.id == chosen).copied())
            .or_else(|| kids.last().copied())
    }

    /// Depth-first pre-order of the subtree rooted at `root`.
    fn subtree(&self, root: &'a Message, visited: &mut HashSet<&'a MessageId>) -> Vec<Message> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !visited.insert(&node.id) {
                continue;
            }
            out.push(node.clone());
            stack.extend(self.children_of(Some(&node.id)).iter().rev());
        }
        out
    }
}

/// Partition `messages` using recency only.
#[must_use]
pub fn resolve(messages: &[Message]) -> Vec<Segment> {
    resolve_with(messages, &BranchSelection::default())
}

/// Partition `messages`, honoring explicit branch choices.
#[must_use]
pub fn resolve_with(messages: &[Message], selection: &BranchSelection) -> Vec<Segment> {
    let tree = Tree::build(messages);
    let mut visited: HashSet<&MessageId> = HashSet::new();
    let mut out = Vec::new();

    let mut parent: Option<&Message> = None;
    loop {
        let parent_id = parent.map(|p| &p.id);
        let active = tree.active_child(parent_id, selection);
        for &sibling in tree.children_of(parent_id) {
            if active.is_some_and(|a| a.id == sibling.id) {
                continue;
            }
            let branch = tree.subtree(sibling, &mut visited);
            if !branch.is_empty() {
                out.push(Segment::OutdatedBranch(branch));
            }
        }
        let Some(node) = active else { break };
        if !visited.insert(&node.id) {
            break;
        }
        out.push(Segment::ActiveMessage(node.clone()));
        parent = Some(node);
    }

    out
}

/// Only the active chain, root first.
#[must_use]
pub fn active_path(messages: &[Message], selection: &BranchSelection) -> Vec<Message> {
    let tree = Tree::build(messages);
    let mut visited: HashSet<&MessageId> = HashSet::new();
    let mut out = Vec::new();
    let mut parent: Option<&MessageId> = None;
    while let Some(node) = tree.active_child(parent, selection) {
        if !visited.insert(&node.id) {
            break;
        }
        out.push(node.clone());
        parent = Some(&node.id);
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
