//! Drafts
//!
//! A [`Draft`] is a tracked, mutable stand-in for an immutable [`Node`].
//! Reads through a draft are recorded against the running effect; writes
//! go to a lazily allocated shadow copy, so the base tree is never touched.
//!
//! # Lifecycle
//!
//! 1. [`draft`] wraps a node and becomes the root of a draft tree.
//!
//! 2. Reading a nested node hands out a child draft. The child is stored in
//!    the parent's copy, so reading the same slot again returns the same
//!    draft.
//!
//! 3. The first write that changes something allocates the copy and marks
//!    the draft and all its ancestors modified. Writing a value identical to
//!    the current one does neither.
//!
//! 4. [`snapshot`](crate::snapshot) turns the tree back into plain nodes,
//!    sharing everything that was not modified.
//!
//! 5. [`Draft::dispose`] drops the whole tree.
//!
//! Object and array operations live in `common`, map and set operations in
//! `collection`.

mod collection;
mod common;
mod state;

pub(crate) use state::DraftState;

use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::DraftResult;
use crate::reactive::{after_mutation, DraftId, ListenerId, Runtime};
use crate::value::{Node, NodeKind, Value};

/// Handle to a draft in the current thread's runtime.
///
/// Handles are plain ids: copying one is free, and a handle whose tree was
/// disposed reads as empty and refuses writes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Draft {
    id: DraftId,
}

impl From<DraftId> for Draft {
    fn from(id: DraftId) -> Self {
        Self { id }
    }
}

impl fmt::Debug for Draft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Draft({})", self.id.raw())
    }
}

impl Draft {
    /// Start a new draft tree over `node`.
    ///
    /// Returns `None` if the node is frozen or marked raw.
    pub fn new(node: Node) -> Option<Self> {
        if !node.is_draftable() {
            return None;
        }
        Some(Runtime::with(|rt| rt.create_state(node, None)).into())
    }

    /// The draft's id.
    pub fn id(&self) -> DraftId {
        self.id
    }

    /// Whether the draft's tree has not been disposed.
    pub fn is_alive(&self) -> bool {
        Runtime::with(|rt| rt.states.contains_key(&self.id))
    }

    /// Kind of the drafted node.
    pub fn kind(&self) -> Option<NodeKind> {
        Runtime::with(|rt| rt.kind_of(self.id).ok())
    }

    /// The node this draft was created over.
    pub fn base(&self) -> Option<Node> {
        Runtime::with(|rt| rt.states.get(&self.id).map(|state| state.base.clone()))
    }

    /// Root of the draft tree.
    pub fn root(&self) -> Option<Draft> {
        Runtime::with(|rt| rt.states.get(&self.id).map(|state| state.root.into()))
    }

    /// The draft this one was reached through.
    pub fn parent(&self) -> Option<Draft> {
        Runtime::with(|rt| {
            rt.states
                .get(&self.id)
                .and_then(|state| state.parent)
                .map(Draft::from)
        })
    }

    /// Whether anything in this draft's subtree changed since it was
    /// created or last snapshotted.
    pub fn is_modified(&self) -> bool {
        Runtime::with(|rt| rt.states.get(&self.id).is_some_and(|state| state.modified))
    }

    /// Current content as a plain value, without tracking or drafting.
    ///
    /// Returns `Null` for a disposed draft.
    pub fn latest(&self) -> Value {
        Runtime::with(|rt| rt.latest_value(self.id)).unwrap_or(Value::Null)
    }

    /// Register `listener` to run once per flush in which anything in this
    /// draft's subtree changed.
    pub fn watch(&self, listener: impl Fn() + 'static) -> Unwatch {
        let listener: Rc<dyn Fn()> = Rc::new(listener);
        let id = ListenerId::next();
        let registered = Runtime::with(|rt| match rt.states.get_mut(&self.id) {
            Some(state) => {
                state.listeners.insert(id, listener);
                true
            }
            None => false,
        });
        Unwatch {
            draft: self.id,
            listener: registered.then_some(id),
        }
    }

    /// Tear down the whole tree this draft belongs to.
    ///
    /// Every state, dep and listener of the tree is dropped. Handles into
    /// the tree read as empty afterwards and writes fail with
    /// [`DraftError::Disposed`](crate::DraftError::Disposed).
    pub fn dispose(&self) {
        let removed: Vec<DraftState> = Runtime::with(|rt| {
            let Some(root) = rt.states.get(&self.id).map(|state| state.root) else {
                return Vec::new();
            };
            let mut tree = vec![root];
            let mut next = 0;
            while let Some(id) = tree.get(next).copied() {
                next += 1;
                if let Some(state) = rt.states.get(&id) {
                    tree.extend(state.children.iter().copied());
                }
            }

            let mut removed = Vec::with_capacity(tree.len());
            for id in tree {
                rt.drop_deps_of(id);
                rt.queue.pending.shift_remove(&id);
                if let Some(state) = rt.states.remove(&id) {
                    removed.push(state);
                }
            }
            debug!(root = root.raw(), drafts = removed.len(), "draft tree disposed");
            removed
        });
        // Listeners are user closures; drop them outside the runtime.
        drop(removed);
    }

    /// Run a mutation against the runtime, then let triggered effects run.
    pub(crate) fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Runtime) -> DraftResult<R>,
    ) -> DraftResult<R> {
        let result = Runtime::with(f);
        after_mutation();
        result
    }
}

/// Handle returned by [`watch`]; call [`Unwatch::unwatch`] to unsubscribe.
#[derive(Debug)]
#[must_use = "dropping an Unwatch keeps the listener registered"]
pub struct Unwatch {
    draft: DraftId,
    listener: Option<ListenerId>,
}

impl Unwatch {
    /// Remove the listener. Does nothing if the draft was disposed or the
    /// registration was a no-op.
    pub fn unwatch(self) {
        let Some(listener) = self.listener else {
            return;
        };
        let removed = Runtime::with(|rt| {
            rt.states
                .get_mut(&self.draft)
                .and_then(|state| state.listeners.shift_remove(&listener))
        });
        drop(removed);
    }
}

/// Draft `value`.
///
/// Nodes that are frozen or marked raw, primitives and opaque values are
/// returned unchanged, as are values that already are drafts.
pub fn draft(value: impl Into<Value>) -> Value {
    let value = value.into();
    if let Value::Node(node) = &value {
        if let Some(draft) = Draft::new(node.clone()) {
            return Value::Draft(draft);
        }
    }
    if !value.is_draft() && Runtime::with(|rt| rt.config.dev_warnings) {
        warn!(kind = value.type_name(), "value cannot be drafted; returned as is");
    }
    value
}

/// Register `listener` on `value` if it is a live draft.
///
/// Anything else gets a handle that does nothing.
pub fn watch(value: &Value, listener: impl Fn() + 'static) -> Unwatch {
    match value {
        Value::Draft(draft) => draft.watch(listener),
        _ => Unwatch {
            draft: DraftId::next(),
            listener: None,
        },
    }
}

/// Whether `value` is a draft with changes in its subtree.
pub fn is_modified(value: &Value) -> bool {
    value.as_draft().is_some_and(|draft| draft.is_modified())
}

/// Opt `value` out of drafting permanently. Only nodes carry the mark.
pub fn mark_raw(value: Value) -> Value {
    if let Value::Node(node) = &value {
        node.mark_raw();
    }
    value
}

/// The original, untracked node behind a draft. Other values are returned
/// unchanged.
pub fn to_base(value: &Value) -> Value {
    Runtime::with(|rt| rt.base_of(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Container;

    fn node() -> Node {
        Node::new(Container::Object(Default::default()))
    }

    #[test]
    fn draft_refuses_undraftable_values() {
        assert_eq!(draft(1), Value::from(1));

        let frozen = Node::frozen(Container::Array(Vec::new()));
        assert!(!draft(frozen.clone()).is_draft());

        let raw = mark_raw(Value::Node(node()));
        assert!(!draft(raw).is_draft());
    }

    #[test]
    fn draft_is_idempotent() {
        let drafted = draft(node());
        assert!(drafted.is_draft());
        assert_eq!(draft(drafted.clone()), drafted);
    }

    #[test]
    fn to_base_unwraps_drafts() {
        let base = node();
        let drafted = draft(base.clone());
        assert_eq!(to_base(&drafted), Value::Node(base));
        assert_eq!(to_base(&Value::from("x")), Value::from("x"));
    }

    #[test]
    fn dispose_drops_the_tree() {
        let handle = Draft::new(node()).unwrap();
        assert!(handle.is_alive());
        assert_eq!(handle.root(), Some(handle));

        handle.dispose();
        assert!(!handle.is_alive());
        assert_eq!(handle.latest(), Value::Null);
        assert!(handle.watch(|| {}).listener.is_none());
    }

    #[test]
    fn dispose_from_descendant_drops_whole_tree() {
        let root = draft(serde_json::json!({ "a": { "b": { "c": 1 } } }))
            .as_draft()
            .unwrap();
        let other = Draft::new(node()).unwrap();
        let a = root.get("a").and_then(|a| a.as_draft()).unwrap();
        let b = a.get("b").and_then(|b| b.as_draft()).unwrap();

        b.dispose();
        assert!(!root.is_alive());
        assert!(!a.is_alive());
        assert!(!b.is_alive());
        assert!(other.is_alive());
        other.dispose();
    }

    #[test]
    fn unwatch_removes_listener() {
        let handle = Draft::new(node()).unwrap();
        let unwatch = handle.watch(|| {});
        assert_eq!(Runtime::with(|rt| rt.states[&handle.id()].listeners.len()), 1);

        unwatch.unwatch();
        assert_eq!(Runtime::with(|rt| rt.states[&handle.id()].listeners.len()), 0);
        handle.dispose();
    }
}
