//! Immutable Container Nodes
//!
//! A [`Node`] is a reference-counted, immutable container. Nodes are the
//! unit of structural sharing: a snapshot that leaves a subtree untouched
//! hands back the very same `Node` (see [`Node::ptr_eq`]).
//!
//! Nodes never change after construction. The only mutable bits are the
//! `frozen` and `raw` flags, which opt a node out of drafting.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::Value;

/// The shape of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// String-keyed record, insertion ordered.
    Object,
    /// Dense positional list.
    Array,
    /// Ordered map keyed by arbitrary values.
    Map,
    /// Ordered set of values.
    Set,
}

impl NodeKind {
    /// Human readable name, used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Object => "object",
            NodeKind::Array => "array",
            NodeKind::Map => "map",
            NodeKind::Set => "set",
        }
    }

    /// Map and set containers, whose keys are not properties.
    #[inline]
    pub fn is_collection(&self) -> bool {
        matches!(self, NodeKind::Map | NodeKind::Set)
    }
}

/// Container payload, one shape per [`NodeKind`].
#[derive(Debug, Clone)]
pub enum Container {
    /// Object properties.
    Object(IndexMap<Rc<str>, Value>),
    /// Array elements.
    Array(Vec<Value>),
    /// Map entries.
    Map(IndexMap<Value, Value>),
    /// Set members.
    Set(IndexSet<Value>),
}

impl Container {
    /// The kind of this container.
    pub fn kind(&self) -> NodeKind {
        match self {
            Container::Object(_) => NodeKind::Object,
            Container::Array(_) => NodeKind::Array,
            Container::Map(_) => NodeKind::Map,
            Container::Set(_) => NodeKind::Set,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        match self {
            Container::Object(entries) => entries.len(),
            Container::Array(items) => items.len(),
            Container::Map(entries) => entries.len(),
            Container::Set(members) => members.len(),
        }
    }

    /// Returns true if the container holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if any direct or nested value is a draft.
    fn embeds_draft(&self) -> bool {
        match self {
            Container::Object(entries) => entries.values().any(Value::embeds_draft),
            Container::Array(items) => items.iter().any(Value::embeds_draft),
            Container::Map(entries) => entries
                .iter()
                .any(|(k, v)| k.embeds_draft() || v.embeds_draft()),
            Container::Set(members) => members.iter().any(Value::embeds_draft),
        }
    }
}

struct NodeInner {
    container: Container,
    frozen: Cell<bool>,
    raw: Cell<bool>,
    embeds_draft: bool,
}

/// Shared handle to an immutable container.
///
/// Cloning a `Node` clones the handle, not the contents.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

impl Node {
    /// Wrap a container in a new node.
    pub fn new(container: Container) -> Self {
        let embeds_draft = container.embeds_draft();
        Self(Rc::new(NodeInner {
            container,
            frozen: Cell::new(false),
            raw: Cell::new(false),
            embeds_draft,
        }))
    }

    /// Create a node that is frozen from the start.
    pub fn frozen(container: Container) -> Self {
        let node = Self::new(container);
        node.freeze();
        node
    }

    /// The node's contents.
    #[inline]
    pub fn container(&self) -> &Container {
        &self.0.container
    }

    /// The node's kind.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.0.container.kind()
    }

    /// Mark the node non-extensible. Frozen nodes are never drafted.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    /// Whether the node has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    /// Opt the node out of drafting permanently.
    pub fn mark_raw(&self) {
        self.0.raw.set(true);
    }

    /// Whether the node has been opted out of drafting.
    pub fn is_raw(&self) -> bool {
        self.0.raw.get()
    }

    /// Whether `draft` would wrap this node.
    #[inline]
    pub fn is_draftable(&self) -> bool {
        !self.is_frozen() && !self.is_raw()
    }

    /// Whether a draft is reachable from this node through plain nodes.
    ///
    /// Computed once at construction, so checking it never walks the tree.
    #[inline]
    pub fn embeds_draft(&self) -> bool {
        self.0.embeds_draft
    }

    /// Reference identity.
    #[inline]
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.container() {
            Container::Object(entries) => f.debug_map().entries(entries.iter()).finish(),
            Container::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Container::Map(entries) => f
                .debug_tuple("Map")
                .field(&entries.iter().collect::<Vec<_>>())
                .finish(),
            Container::Set(members) => f.debug_set().entries(members.iter()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let node = Node::new(Container::Array(vec![Value::from(1)]));
        let other = node.clone();
        assert!(node.ptr_eq(&other));

        let equal_contents = Node::new(Container::Array(vec![Value::from(1)]));
        assert!(!node.ptr_eq(&equal_contents));
    }

    #[test]
    fn flags_disable_drafting() {
        let node = Node::new(Container::Object(IndexMap::new()));
        assert!(node.is_draftable());

        node.mark_raw();
        assert!(!node.is_draftable());

        let frozen = Node::frozen(Container::Set(IndexSet::new()));
        assert!(frozen.is_frozen());
        assert!(!frozen.is_draftable());
    }

    #[test]
    fn kinds_report_collection() {
        assert!(NodeKind::Map.is_collection());
        assert!(NodeKind::Set.is_collection());
        assert!(!NodeKind::Array.is_collection());
        assert_eq!(NodeKind::Object.as_str(), "object");
    }
}
