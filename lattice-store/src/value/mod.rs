//! Plain Data Values
//!
//! This module defines the data tree the engine works on. A [`Value`] is
//! either a primitive, an immutable container ([`Node`]), a tracked
//! wrapper over a container ([`Draft`]), or an opaque host value that is
//! never drafted.
//!
//! # Equality
//!
//! `PartialEq`, `Eq` and `Hash` are identity based: two nodes are equal only
//! if they are the same allocation, and numbers follow SameValueZero (NaN
//! equals NaN, `0.0` equals `-0.0`). This is what lets values key maps and
//! sets. The write path uses the stricter [`Value::same_value`], which also
//! tells `0.0` and `-0.0` apart.
//!
//! Structural comparison goes through [`Value::to_json`].

mod key;
mod node;
mod serde_impl;

pub use key::Key;
pub use node::{Container, Node, NodeKind};

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::draft::Draft;

/// A host value that is carried through the tree by identity.
///
/// Dates, handles and similar non-plain data go here. The engine never
/// drafts or copies an opaque value.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    /// Wrap a host value.
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Borrow the wrapped value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Reference identity.
    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:#x})", self.addr())
    }
}

/// A value in a state tree.
#[derive(Clone)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Double precision number.
    Number(f64),
    /// Immutable string.
    String(Rc<str>),
    /// Immutable container.
    Node(Node),
    /// Tracked, mutable wrapper over a container.
    Draft(Draft),
    /// Host value carried by identity.
    Opaque(Opaque),
}

impl Value {
    /// Build an object from key/value pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: IndexMap<Rc<str>, Value> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Value::Node(Node::new(Container::Object(entries)))
    }

    /// Build an array.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Node(Node::new(Container::Array(
            items.into_iter().map(Into::into).collect(),
        )))
    }

    /// Build an ordered map.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: IndexMap<Value, Value> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Value::Node(Node::new(Container::Map(entries)))
    }

    /// Build an ordered set.
    pub fn set<V, I>(members: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let members: IndexSet<Value> = members.into_iter().map(Into::into).collect();
        Value::Node(Node::new(Container::Set(members)))
    }

    /// The node, if this is a plain container.
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// The draft handle, if this is a draft.
    pub fn as_draft(&self) -> Option<Draft> {
        match self {
            Value::Draft(draft) => Some(*draft),
            _ => None,
        }
    }

    /// The number, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for drafts.
    pub fn is_draft(&self) -> bool {
        matches!(self, Value::Draft(_))
    }

    /// Type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Node(node) => node.kind().as_str(),
            Value::Draft(_) => "draft",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Strict identity comparison used by writes.
    ///
    /// Like `==`, but `0.0` and `-0.0` are different values.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                (a.is_nan() && b.is_nan())
                    || (a == b && a.is_sign_negative() == b.is_sign_negative())
            }
            _ => self == other,
        }
    }

    /// Whether a draft is reachable from this value through plain nodes.
    pub fn embeds_draft(&self) -> bool {
        match self {
            Value::Draft(_) => true,
            Value::Node(node) => node.embeds_draft(),
            _ => false,
        }
    }

    /// Convert to JSON for inspection and comparison.
    ///
    /// Drafts are rendered from their latest content, maps become arrays of
    /// `[key, value]` pairs, sets become arrays and opaque values become
    /// `null`. Integral numbers render as integers.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null | Value::Opaque(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_impl::number_to_json(*n),
            Value::String(s) => Json::String(s.to_string()),
            Value::Draft(draft) => draft.latest().to_json(),
            Value::Node(node) => match node.container() {
                Container::Object(entries) => Json::Object(
                    entries
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_json()))
                        .collect(),
                ),
                Container::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
                Container::Map(entries) => Json::Array(
                    entries
                        .iter()
                        .map(|(k, v)| Json::Array(vec![k.to_json(), v.to_json()]))
                        .collect(),
                ),
                Container::Set(members) => {
                    Json::Array(members.iter().map(Value::to_json).collect())
                }
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a.ptr_eq(b),
            (Value::Draft(a), Value::Draft(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => s.hash(state),
            Value::Node(node) => node.addr().hash(state),
            Value::Draft(draft) => draft.hash(state),
            Value::Opaque(opaque) => opaque.addr().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Node(node) => node.fmt(f),
            Value::Draft(draft) => draft.fmt(f),
            Value::Opaque(opaque) => opaque.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<Draft> for Value {
    fn from(draft: Draft) -> Self {
        Value::Draft(draft)
    }
}

impl From<Opaque> for Value {
    fn from(opaque: Opaque) -> Self {
        Value::Opaque(opaque)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::array(items.into_iter().map(Value::from)),
            Json::Object(entries) => {
                Value::object(entries.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn numbers_follow_same_value_zero() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
        assert!(!Value::from(0.0).same_value(&Value::from(-0.0)));
        assert!(Value::from(f64::NAN).same_value(&Value::from(f64::NAN)));

        let mut seen = HashSet::new();
        seen.insert(Value::from(0.0));
        assert!(seen.contains(&Value::from(-0.0)));
    }

    #[test]
    fn nodes_compare_by_identity() {
        let a = Value::object([("x", 1)]);
        let b = Value::object([("x", 1)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.to_json(), b.to_json());
    }

    #[test]
    fn json_conversion_preserves_shape() {
        let value = Value::from(json!({"a": {"b": 1}, "c": [1, 2.5, null, "s"]}));
        assert_eq!(value.to_json(), json!({"a": {"b": 1}, "c": [1, 2.5, null, "s"]}));
    }

    #[test]
    fn collections_render_as_arrays() {
        let map = Value::map([("k", 1)]);
        assert_eq!(map.to_json(), json!([["k", 1]]));

        let set = Value::set([1, 2, 2]);
        assert_eq!(set.to_json(), json!([1, 2]));
    }

    #[test]
    fn opaque_values_are_identity_only() {
        let stamp = Opaque::new(42_u64);
        assert_eq!(stamp.downcast_ref::<u64>(), Some(&42));
        assert_eq!(Value::from(stamp.clone()), Value::from(stamp));
        assert_ne!(Value::from(Opaque::new(1)), Value::from(Opaque::new(1)));
    }
}
