//! Object and array operations.

use std::rc::Rc;

use super::state::Slot;
use super::Draft;
use crate::error::{DraftError, DraftResult};
use crate::reactive::{DepKey, Runtime, TrackOp};
use crate::value::{Container, Key, NodeKind, Value};

/// Resolve `key` against an object or array.
fn common_slot(kind: NodeKind, key: &Key) -> Option<Slot> {
    match kind {
        NodeKind::Object => Some(Slot::Name(match key {
            Key::Name(name) => name.clone(),
            Key::Index(index) => Rc::from(index.to_string()),
        })),
        NodeKind::Array => key.as_index().map(Slot::Index),
        NodeKind::Map | NodeKind::Set => None,
    }
}

/// Arrays hold at most this many elements; indices stay below it.
const MAX_LENGTH: usize = u32::MAX as usize;

fn length_from(value: &Value) -> DraftResult<usize> {
    value
        .as_f64()
        .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= MAX_LENGTH as f64)
        .map(|n| n as usize)
        .ok_or_else(|| DraftError::InvalidLength {
            value: format!("{value:?}"),
        })
}

/// Truncate or pad `items` with `Null` to `len`. Fails if the padding
/// cannot be allocated.
fn resize_items(items: &mut Vec<Value>, len: usize) -> DraftResult<()> {
    if let Some(extra) = len.checked_sub(items.len()) {
        items
            .try_reserve_exact(extra)
            .map_err(|_| DraftError::InvalidLength {
                value: len.to_string(),
            })?;
    }
    items.resize(len, Value::Null);
    Ok(())
}

/// `===`: like `==`, except that NaN never matches.
fn strict_equals(a: &Value, b: &Value) -> bool {
    a == b && !matches!(a, Value::Number(n) if n.is_nan())
}

fn find_index(items: &[Value], reverse: bool, matches: impl Fn(&Value) -> bool) -> Option<usize> {
    if reverse {
        items.iter().rposition(matches)
    } else {
        items.iter().position(matches)
    }
}

impl Draft {
    /// Read a property or array element.
    ///
    /// A nested node comes back as a child draft. On arrays, `"length"`
    /// reads the length. Returns `None` for missing slots, for maps and
    /// sets, and for disposed drafts.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        Runtime::with(|rt| {
            let state = rt.states.get(&self.id)?;
            let kind = state.base.kind();
            if kind == NodeKind::Array && key.is_length() {
                let len = state.current().len();
                rt.track(self.id, TrackOp::Get, DepKey::Length);
                return Some(Value::from(len));
            }

            let slot = common_slot(kind, &key)?;
            let dep_key = rt.slot_dep_key(&slot);
            rt.track(self.id, TrackOp::Get, dep_key);

            let value = slot.get(rt.states.get(&self.id)?.current())?.clone();
            Some(rt.resolve_read(self.id, &slot, value))
        })
    }

    /// Write a property or array element.
    ///
    /// Writing an index past the end of an array pads with `Null`; writing
    /// `"length"` truncates or pads.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> DraftResult<()> {
        let key = key.into();
        let value = value.into();
        self.mutate(|rt| {
            rt.check_writable(self.id, || key.to_string())?;
            match rt.kind_of(self.id)? {
                NodeKind::Array if key.is_length() => {
                    let len = length_from(&value)?;
                    rt.array_apply(self.id, |items| resize_items(items, len))?
                }
                NodeKind::Array => {
                    let index = key
                        .as_index()
                        .filter(|index| *index < MAX_LENGTH)
                        .ok_or_else(|| DraftError::invalid_key(&key, "array"))?;
                    let len = rt.states.get(&self.id).map_or(0, |state| state.current().len());
                    if index < len {
                        rt.write_slot(self.id, Slot::Index(index), value)
                    } else {
                        rt.array_apply(self.id, move |items| {
                            resize_items(items, index)?;
                            items.push(value);
                            Ok(())
                        })?
                    }
                }
                NodeKind::Object => {
                    let slot = common_slot(NodeKind::Object, &key)
                        .ok_or_else(|| DraftError::invalid_key(&key, "object"))?;
                    rt.write_slot(self.id, slot, value)
                }
                other => Err(DraftError::kind_mismatch("object or array", other.as_str())),
            }
        })
    }

    /// Delete a property. Returns whether it existed.
    pub fn delete(&self, key: impl Into<Key>) -> DraftResult<bool> {
        let key = key.into();
        self.mutate(|rt| {
            rt.check_writable(self.id, || key.to_string())?;
            match rt.kind_of(self.id)? {
                NodeKind::Object => {
                    let slot = common_slot(NodeKind::Object, &key)
                        .ok_or_else(|| DraftError::invalid_key(&key, "object"))?;
                    rt.delete_slot(self.id, slot)
                }
                other => Err(DraftError::kind_mismatch("object", other.as_str())),
            }
        })
    }

    /// Whether a property or array element exists.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        Runtime::with(|rt| {
            let Some(state) = rt.states.get(&self.id) else {
                return false;
            };
            let kind = state.base.kind();
            if kind == NodeKind::Array && key.is_length() {
                return true;
            }
            let Some(slot) = common_slot(kind, &key) else {
                return false;
            };
            let found = slot.get(state.current()).is_some();
            let dep_key = rt.slot_dep_key(&slot);
            rt.track(self.id, TrackOp::Has, dep_key);
            found
        })
    }

    /// Property names of an object, or indices of an array.
    pub fn keys(&self) -> Vec<Key> {
        Runtime::with(|rt| {
            let Some(state) = rt.states.get(&self.id) else {
                return Vec::new();
            };
            let (keys, dep_key): (Vec<Key>, DepKey) = match state.current() {
                Container::Object(entries) => (
                    entries.keys().map(|name| Key::Name(name.clone())).collect(),
                    DepKey::Iterate,
                ),
                Container::Array(items) => ((0..items.len()).map(Key::Index).collect(), DepKey::Length),
                Container::Map(_) | Container::Set(_) => return Vec::new(),
            };
            rt.track(self.id, TrackOp::Iterate, dep_key);
            keys
        })
    }

    /// Number of properties, elements, entries or members.
    pub fn len(&self) -> usize {
        Runtime::with(|rt| {
            let Some(state) = rt.states.get(&self.id) else {
                return 0;
            };
            let len = state.current().len();
            let dep_key = match state.base.kind() {
                NodeKind::Array => DepKey::Length,
                _ => DepKey::Iterate,
            };
            rt.track(self.id, TrackOp::Iterate, dep_key);
            len
        })
    }

    /// Whether [`Draft::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of an object or array, in order, with nested nodes drafted.
    /// Maps yield their values and sets their members.
    pub fn values(&self) -> Vec<Value> {
        match self.kind() {
            Some(NodeKind::Map) => self.map_values(),
            Some(NodeKind::Set) => self.set_values(),
            Some(_) => self
                .keys()
                .into_iter()
                .filter_map(|key| self.get(key))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Key/value pairs of an object or array, with nested nodes drafted.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.get(key.clone()).map(|value| (key, value)))
            .collect()
    }

    /// Append to an array. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> DraftResult<usize> {
        let value = value.into();
        self.mutate(|rt| {
            rt.check_writable(self.id, || "push".into())?;
            rt.array_apply(self.id, |items| {
                items.push(value);
                items.len()
            })
        })
    }

    /// Remove the last element of an array.
    pub fn pop(&self) -> DraftResult<Option<Value>> {
        self.mutate(|rt| {
            rt.check_writable(self.id, || "pop".into())?;
            rt.array_apply(self.id, |items| items.pop())
        })
    }

    /// Remove the first element of an array.
    pub fn shift(&self) -> DraftResult<Option<Value>> {
        self.mutate(|rt| {
            rt.check_writable(self.id, || "shift".into())?;
            rt.array_apply(self.id, |items| {
                if items.is_empty() {
                    None
                } else {
                    Some(items.remove(0))
                }
            })
        })
    }

    /// Prepend to an array. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> DraftResult<usize> {
        let value = value.into();
        self.mutate(|rt| {
            rt.check_writable(self.id, || "unshift".into())?;
            rt.array_apply(self.id, |items| {
                items.insert(0, value);
                items.len()
            })
        })
    }

    /// Remove `delete_count` elements at `start` and insert `items` in
    /// their place. Returns the removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> DraftResult<Vec<Value>> {
        let insert: Vec<Value> = items.into_iter().collect();
        self.mutate(|rt| {
            rt.check_writable(self.id, || "splice".into())?;
            rt.array_apply(self.id, |current| {
                let start = start.min(current.len());
                let end = start.saturating_add(delete_count).min(current.len());
                current.splice(start..end, insert).collect()
            })
        })
    }

    /// Shorten an array to `len` elements. Longer lengths do nothing.
    pub fn truncate(&self, len: usize) -> DraftResult<()> {
        self.mutate(|rt| {
            rt.check_writable(self.id, || "length".into())?;
            rt.array_apply(self.id, |items| items.truncate(len))
        })
    }

    /// Whether an array contains `value` (SameValueZero).
    pub fn includes(&self, value: &Value) -> bool {
        self.search(value, false, |a, b| a == b).is_some()
    }

    /// First index of `value` in an array (strict equality).
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.search(value, false, strict_equals)
    }

    /// Last index of `value` in an array (strict equality).
    pub fn last_index_of(&self, value: &Value) -> Option<usize> {
        self.search(value, true, strict_equals)
    }

    /// Track every element, then look for `needle` as given; failing that,
    /// compare unwrapped values on both sides, since the same element can
    /// be held as a draft or as its base.
    fn search(
        &self,
        needle: &Value,
        reverse: bool,
        equals: impl Fn(&Value, &Value) -> bool,
    ) -> Option<usize> {
        Runtime::with(|rt| {
            let items = match rt.states.get(&self.id)?.current() {
                Container::Array(items) => items.clone(),
                _ => return None,
            };
            rt.track(self.id, TrackOp::Get, DepKey::Length);
            for index in 0..items.len() {
                rt.track(self.id, TrackOp::Get, DepKey::Key(Key::Index(index)));
            }

            find_index(&items, reverse, |item| equals(item, needle)).or_else(|| {
                let raw = rt.base_of(needle);
                find_index(&items, reverse, |item| equals(&rt.base_of(item), &raw))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::draft;
    use crate::reactive::{effect, flush};
    use std::cell::Cell;

    fn drafted(value: serde_json::Value) -> Draft {
        draft(Value::from(value)).as_draft().unwrap()
    }

    #[test]
    fn get_drafts_nested_nodes_once() {
        let root = drafted(serde_json::json!({ "a": { "b": 1 } }));
        let first = root.get("a").unwrap();
        let second = root.get("a").unwrap();

        assert!(first.is_draft());
        assert_eq!(first, second);
        assert_eq!(first.as_draft().unwrap().parent(), Some(root));
        assert!(!root.is_modified());
        root.dispose();
    }

    #[test]
    fn array_length_and_padding() {
        let list = drafted(serde_json::json!([1, 2]));
        assert_eq!(list.get("length"), Some(Value::from(2)));

        list.set(4, 5).unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(list.get(3), Some(Value::Null));

        list.set("length", 1).unwrap();
        assert_eq!(list.latest().to_json(), serde_json::json!([1]));

        assert!(matches!(
            list.set("length", -1),
            Err(DraftError::InvalidLength { .. })
        ));
        assert!(matches!(
            list.set("x", 1),
            Err(DraftError::InvalidKey { .. })
        ));
        list.dispose();
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let list = drafted(serde_json::json!([1]));

        assert!(matches!(
            list.set(usize::MAX, 1),
            Err(DraftError::InvalidKey { .. })
        ));
        assert!(matches!(
            list.set(MAX_LENGTH, 1),
            Err(DraftError::InvalidKey { .. })
        ));
        assert!(matches!(
            list.set("length", 4_294_967_296.0),
            Err(DraftError::InvalidLength { .. })
        ));

        assert_eq!(list.len(), 1);
        assert!(!list.is_modified());
        list.dispose();
    }

    #[test]
    fn array_mutators() {
        let list = drafted(serde_json::json!([1, 2, 3]));
        assert_eq!(list.push(4).unwrap(), 4);
        assert_eq!(list.pop().unwrap(), Some(Value::from(4)));
        assert_eq!(list.shift().unwrap(), Some(Value::from(1)));
        assert_eq!(list.unshift(0).unwrap(), 3);

        let removed = list.splice(1, 1, [Value::from(7), Value::from(8)]).unwrap();
        assert_eq!(removed, vec![Value::from(2)]);
        assert_eq!(list.latest().to_json(), serde_json::json!([0, 7, 8, 3]));

        list.truncate(2).unwrap();
        assert_eq!(list.latest().to_json(), serde_json::json!([0, 7]));
        assert!(matches!(list.delete(0), Err(DraftError::KindMismatch { .. })));
        list.dispose();
    }

    #[test]
    fn search_falls_back_to_base() {
        let list = drafted(serde_json::json!([{ "id": 1 }, { "id": 2 }]));
        let base_item = list.base().unwrap();
        let Container::Array(items) = base_item.container() else {
            panic!("expected array base");
        };
        let second_base = items[1].clone();

        // Drafted copy of element 1, searched by its base.
        let second = list.get(1).unwrap();
        assert!(second.is_draft());
        assert_eq!(list.index_of(&second_base), Some(1));
        assert_eq!(list.index_of(&second), Some(1));
        assert!(list.includes(&items[0]));
        list.dispose();
    }

    #[test]
    fn nan_matches_only_in_includes() {
        let list = drafted(serde_json::json!([1]));
        list.push(f64::NAN).unwrap();
        assert!(list.includes(&Value::from(f64::NAN)));
        assert_eq!(list.index_of(&Value::from(f64::NAN)), None);
        assert_eq!(list.last_index_of(&Value::from(1)), Some(0));
        list.dispose();
    }

    #[test]
    fn object_delete_and_keys() {
        let obj = drafted(serde_json::json!({ "a": 1, "b": 2 }));
        assert!(obj.has("a"));
        assert!(obj.delete("a").unwrap());
        assert!(!obj.delete("a").unwrap());
        assert_eq!(obj.keys(), vec![Key::from("b")]);
        obj.dispose();
    }

    #[test]
    fn push_does_not_track_inside_effects() {
        let list = drafted(serde_json::json!([]));
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let pusher = effect(move || {
            runs_clone.set(runs_clone.get() + 1);
            if runs_clone.get() < 5 {
                list.push(1).unwrap();
            }
        });

        assert_eq!(runs.get(), 1);
        assert_eq!(pusher.dependency_count(), 0);
        pusher.stop();
        flush();
        list.dispose();
    }
}
