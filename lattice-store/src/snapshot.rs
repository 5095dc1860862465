//! Snapshot Builder
//!
//! [`snapshot`] turns a draft tree back into plain, immutable nodes.
//!
//! # Algorithm
//!
//! The builder walks the tree post-order, following drafts only:
//!
//! - A modified state gets a new node built from its copy, with every
//!   nested draft replaced by its own snapshot. The node is cached on the
//!   state and the state goes back to unmodified, so the next snapshot
//!   without intervening writes returns the same node.
//! - An unmodified state returns its cached node, or its base if it was
//!   never modified. A base only gets rebuilt if it embeds drafts, and then
//!   only along the paths that lead to them.
//!
//! Subtrees that were never drafted are returned by reference and never
//! walked.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::draft::Draft;
use crate::reactive::{DraftId, Runtime};
use crate::value::{Container, Node, Value};

struct SnapshotBuilder<'a> {
    rt: &'a mut Runtime,
    /// Snapshot of each state visited during this call.
    memo: HashMap<DraftId, Value>,
    /// States on the current path, to stop on cycles.
    visiting: HashSet<DraftId>,
}

impl SnapshotBuilder<'_> {
    fn finalize(&mut self, id: DraftId) -> Value {
        if let Some(value) = self.memo.get(&id) {
            return value.clone();
        }
        let Some(state) = self.rt.states.get(&id) else {
            debug!(draft = id.raw(), "snapshot of disposed draft");
            return Value::Null;
        };
        if !self.visiting.insert(id) {
            return Value::Node(state.base.clone());
        }

        let result = if state.modified {
            let copy = state
                .copy
                .clone()
                .unwrap_or_else(|| state.base.container().clone());
            let node = Node::new(self.substitute_container(&copy));
            debug!(draft = id.raw(), kind = node.kind().as_str(), "snapshot materialized");
            if let Some(state) = self.rt.states.get_mut(&id) {
                state.finalized = Some(node.clone());
                state.modified = false;
            }
            Value::Node(node)
        } else if let Some(node) = &state.finalized {
            Value::Node(node.clone())
        } else if state.base.embeds_draft() {
            let base = state.base.clone();
            self.rebuild(&base)
        } else {
            Value::Node(state.base.clone())
        };

        self.visiting.remove(&id);
        self.memo.insert(id, result.clone());
        result
    }

    fn substitute(&mut self, value: &Value) -> Value {
        match value {
            Value::Draft(draft) => self.finalize(draft.id()),
            Value::Node(node) if node.embeds_draft() => self.rebuild(node),
            other => other.clone(),
        }
    }

    fn rebuild(&mut self, node: &Node) -> Value {
        let container = self.substitute_container(node.container());
        Value::Node(Node::new(container))
    }

    fn substitute_container(&mut self, container: &Container) -> Container {
        match container {
            Container::Object(entries) => Container::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), self.substitute(value)))
                    .collect(),
            ),
            Container::Array(items) => {
                Container::Array(items.iter().map(|item| self.substitute(item)).collect())
            }
            Container::Map(entries) => Container::Map(
                entries
                    .iter()
                    .map(|(key, value)| (self.substitute(key), self.substitute(value)))
                    .collect(),
            ),
            Container::Set(members) => {
                Container::Set(members.iter().map(|member| self.substitute(member)).collect())
            }
        }
    }
}

/// Produce the immutable projection of `value`, materializing the tree of
/// `draft` first.
///
/// Every draft reachable from `value` is replaced by its snapshot. Nodes
/// that were not modified keep their identity.
pub fn snapshot(value: &Value, draft: Draft) -> Value {
    Runtime::with(|rt| {
        let mut builder = SnapshotBuilder {
            rt,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        };
        builder.finalize(draft.id());
        builder.substitute(value)
    })
}

impl Draft {
    /// Snapshot of this draft.
    pub fn snapshot(&self) -> Value {
        snapshot(&Value::Draft(*self), *self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::draft;
    use serde_json::json;

    fn node_of(value: &Value) -> &Node {
        value.as_node().unwrap()
    }

    #[test]
    fn untouched_draft_returns_base() {
        let base = Value::from(json!({ "a": { "b": 1 } }));
        let root = draft(base.clone()).as_draft().unwrap();
        root.get("a");

        let snap = root.snapshot();
        assert!(node_of(&snap).ptr_eq(node_of(&base)));
        root.dispose();
    }

    #[test]
    fn repeated_snapshots_share_the_node() {
        let root = draft(json!({ "a": 1 })).as_draft().unwrap();
        root.set("a", 2).unwrap();

        let first = root.snapshot();
        assert!(!root.is_modified());
        let second = root.snapshot();
        assert!(node_of(&first).ptr_eq(node_of(&second)));
        assert_eq!(first.to_json(), json!({ "a": 2 }));
        root.dispose();
    }

    #[test]
    fn embedded_drafts_are_substituted() {
        let inner = draft(json!({ "x": 1 })).as_draft().unwrap();
        inner.set("x", 2).unwrap();
        let holder = Value::array([Value::Draft(inner), Value::from(3)]);

        let snap = snapshot(&holder, inner);
        assert_eq!(snap.to_json(), json!([{ "x": 2 }, 3]));
        inner.dispose();
    }

    #[test]
    fn disposed_draft_snapshots_to_null() {
        let root = draft(json!({})).as_draft().unwrap();
        root.dispose();
        assert_eq!(root.snapshot(), Value::Null);
    }
}
