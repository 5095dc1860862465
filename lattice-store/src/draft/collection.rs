//! Map and set operations.
//!
//! Map and set contents are not properties, so size and enumeration are
//! tracked through the synthetic `Iterate` dep, and map key enumeration
//! through `MapKeyIterate`. Entries are tracked by their base key, so a
//! lookup through a draft and through its base hit the same dep.

use super::state::{DraftKind, Slot};
use super::Draft;
use crate::error::{DraftError, DraftResult};
use crate::reactive::{DepKey, DraftId, Runtime, TrackOp, TriggerOp};
use crate::value::{Container, NodeKind, Value};

impl Runtime {
    /// The key under which a map stores `key`: as given, or its base.
    fn map_slot(&self, id: DraftId, key: &Value) -> Option<Value> {
        let Container::Map(entries) = self.states.get(&id)?.current() else {
            return None;
        };
        if entries.contains_key(key) {
            return Some(key.clone());
        }
        let raw = self.base_of(key);
        entries.contains_key(&raw).then_some(raw)
    }

    /// The member a set holds for `value`: the value itself, its base, or
    /// the draft made from its base.
    fn set_member(&self, id: DraftId, value: &Value) -> Option<Value> {
        let state = self.states.get(&id)?;
        let Container::Set(members) = state.current() else {
            return None;
        };
        if members.contains(value) {
            return Some(value.clone());
        }
        let raw = self.base_of(value);
        if members.contains(&raw) {
            return Some(raw);
        }
        match &state.kind {
            DraftKind::Set { drafted } => drafted
                .get(&raw)
                .map(|child| Value::Draft((*child).into()))
                .filter(|member| members.contains(member)),
            _ => None,
        }
    }

    fn expect_kind(&self, id: DraftId, expected: NodeKind) -> DraftResult<()> {
        let found = self.kind_of(id)?;
        if found == expected {
            Ok(())
        } else {
            Err(DraftError::kind_mismatch(expected.as_str(), found.as_str()))
        }
    }
}

impl Draft {
    /// Look up a map entry. A nested node comes back as a child draft.
    pub fn map_get(&self, key: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        Runtime::with(|rt| {
            if rt.kind_of(self.id).ok()? != NodeKind::Map {
                return None;
            }
            let raw = rt.base_of(&key);
            rt.track(self.id, TrackOp::Get, DepKey::Entry(raw));

            let slot_key = rt.map_slot(self.id, &key)?;
            let slot = Slot::Entry(slot_key);
            let value = slot.get(rt.states.get(&self.id)?.current())?.clone();
            Some(rt.resolve_read(self.id, &slot, value))
        })
    }

    /// Insert or overwrite a map entry.
    pub fn map_set(&self, key: impl Into<Value>, value: impl Into<Value>) -> DraftResult<()> {
        let key = key.into();
        let value = value.into();
        self.mutate(|rt| {
            rt.check_writable(self.id, || format!("{key:?}"))?;
            rt.expect_kind(self.id, NodeKind::Map)?;
            let slot_key = rt.map_slot(self.id, &key).unwrap_or(key);
            rt.write_slot(self.id, Slot::Entry(slot_key), value)
        })
    }

    /// Whether a map has an entry for `key`.
    pub fn map_has(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        Runtime::with(|rt| {
            if rt.kind_of(self.id).ok() != Some(NodeKind::Map) {
                return false;
            }
            let raw = rt.base_of(&key);
            rt.track(self.id, TrackOp::Has, DepKey::Entry(raw));
            rt.map_slot(self.id, &key).is_some()
        })
    }

    /// Remove a map entry. Returns whether it existed.
    pub fn map_delete(&self, key: impl Into<Value>) -> DraftResult<bool> {
        let key = key.into();
        self.mutate(|rt| {
            rt.check_writable(self.id, || format!("{key:?}"))?;
            rt.expect_kind(self.id, NodeKind::Map)?;
            match rt.map_slot(self.id, &key) {
                Some(slot_key) => rt.delete_slot(self.id, Slot::Entry(slot_key)),
                None => Ok(false),
            }
        })
    }

    /// Map keys, in insertion order. Keys are returned as stored.
    pub fn map_keys(&self) -> Vec<Value> {
        Runtime::with(|rt| {
            let keys: Vec<Value> = match rt.states.get(&self.id).map(|state| state.current()) {
                Some(Container::Map(entries)) => entries.keys().cloned().collect(),
                _ => return Vec::new(),
            };
            rt.track(self.id, TrackOp::Iterate, DepKey::MapKeyIterate);
            keys
        })
    }

    /// Map values, in insertion order, with nested nodes drafted.
    pub fn map_values(&self) -> Vec<Value> {
        self.map_entries()
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }

    /// Map entries, in insertion order, with nested values drafted.
    pub fn map_entries(&self) -> Vec<(Value, Value)> {
        Runtime::with(|rt| {
            let entries: Vec<(Value, Value)> =
                match rt.states.get(&self.id).map(|state| state.current()) {
                    Some(Container::Map(entries)) => entries
                        .iter()
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect(),
                    _ => return Vec::new(),
                };
            rt.track(self.id, TrackOp::Iterate, DepKey::Iterate);
            entries
                .into_iter()
                .map(|(key, value)| {
                    let value = rt.resolve_read(self.id, &Slot::Entry(key.clone()), value);
                    (key, value)
                })
                .collect()
        })
    }

    /// Add a member to a set. Adding a member already present, by value,
    /// by draft or by base, does nothing.
    pub fn set_add(&self, value: impl Into<Value>) -> DraftResult<()> {
        let value = value.into();
        self.mutate(|rt| {
            rt.check_writable(self.id, || format!("{value:?}"))?;
            rt.expect_kind(self.id, NodeKind::Set)?;
            if rt.set_member(self.id, &value).is_some() {
                return Ok(());
            }

            rt.mark_changed(self.id);
            let raw = rt.base_of(&value);
            if let Some(Container::Set(members)) =
                rt.states.get_mut(&self.id).and_then(|state| state.copy.as_mut())
            {
                members.insert(value);
            }
            rt.trigger(self.id, NodeKind::Set, TriggerOp::Add, Some(DepKey::Entry(raw)));
            rt.notify_change(self.id);
            Ok(())
        })
    }

    /// Whether a set holds `value`, by value, by draft or by base.
    pub fn set_has(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        Runtime::with(|rt| {
            if rt.kind_of(self.id).ok() != Some(NodeKind::Set) {
                return false;
            }
            let raw = rt.base_of(&value);
            rt.track(self.id, TrackOp::Has, DepKey::Entry(raw));
            rt.set_member(self.id, &value).is_some()
        })
    }

    /// Remove a member from a set. Returns whether it was present.
    pub fn set_delete(&self, value: impl Into<Value>) -> DraftResult<bool> {
        let value = value.into();
        self.mutate(|rt| {
            rt.check_writable(self.id, || format!("{value:?}"))?;
            rt.expect_kind(self.id, NodeKind::Set)?;
            if rt.set_member(self.id, &value).is_none() {
                return Ok(false);
            }

            // Preparing the copy drafts members, so look the member up again.
            rt.mark_changed(self.id);
            let Some(member) = rt.set_member(self.id, &value) else {
                return Ok(false);
            };
            let raw = rt.base_of(&member);
            if let Some(Container::Set(members)) =
                rt.states.get_mut(&self.id).and_then(|state| state.copy.as_mut())
            {
                members.shift_remove(&member);
            }
            rt.trigger(self.id, NodeKind::Set, TriggerOp::Delete, Some(DepKey::Entry(raw)));
            rt.notify_change(self.id);
            Ok(true)
        })
    }

    /// Set members, in insertion order. Nested nodes come back as the
    /// drafts made when the copy was prepared.
    pub fn set_values(&self) -> Vec<Value> {
        Runtime::with(|rt| {
            let needs_copy = match rt.states.get(&self.id) {
                Some(state) => match state.current() {
                    Container::Set(members) => {
                        state.copy.is_none()
                            && members.iter().any(|member| {
                                member.as_node().is_some_and(|node| node.is_draftable())
                            })
                    }
                    _ => return Vec::new(),
                },
                None => return Vec::new(),
            };
            if needs_copy {
                rt.prepare_copy(self.id);
            }

            rt.track(self.id, TrackOp::Iterate, DepKey::Iterate);
            let members: Vec<Value> = match rt.states.get(&self.id).map(|state| state.current()) {
                Some(Container::Set(members)) => members.iter().cloned().collect(),
                _ => Vec::new(),
            };
            for member in &members {
                if let Value::Draft(child) = member {
                    rt.track_draft_ref(child.id());
                }
            }
            members
        })
    }

    /// Remove every entry of a map or member of a set.
    pub fn clear(&self) -> DraftResult<()> {
        self.mutate(|rt| {
            rt.check_writable(self.id, || "clear".into())?;
            let kind = rt.kind_of(self.id)?;
            if !kind.is_collection() {
                return Err(DraftError::kind_mismatch("map or set", kind.as_str()));
            }
            if rt
                .states
                .get(&self.id)
                .map_or(true, |state| state.current().is_empty())
            {
                return Ok(());
            }

            rt.mark_changed(self.id);
            match rt.states.get_mut(&self.id).and_then(|state| state.copy.as_mut()) {
                Some(Container::Map(entries)) => entries.clear(),
                Some(Container::Set(members)) => members.clear(),
                _ => {}
            }
            rt.trigger(self.id, kind, TriggerOp::Clear, None);
            rt.notify_change(self.id);
            Ok(())
        })
    }

    /// Number of entries of a map or members of a set.
    pub fn size(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::draft;

    fn object(x: i32) -> Value {
        Value::object([("x", Value::from(x))])
    }

    #[test]
    fn map_get_drafts_values() {
        let map = draft(Value::map([("a", object(1))])).as_draft().unwrap();
        let entry = map.map_get("a").unwrap();
        assert!(entry.is_draft());
        assert_eq!(map.map_get("a"), Some(entry));
        assert!(map.map_has("a"));
        assert!(!map.map_has("b"));
        assert!(!map.is_modified());
        map.dispose();
    }

    #[test]
    fn map_set_and_delete() {
        let map = draft(Value::map([("a", Value::from(1))])).as_draft().unwrap();
        map.map_set("a", 1).unwrap();
        assert!(!map.is_modified());

        map.map_set("b", 2).unwrap();
        assert!(map.is_modified());
        assert_eq!(map.map_keys(), vec![Value::from("a"), Value::from("b")]);
        assert!(map.map_delete("a").unwrap());
        assert!(!map.map_delete("a").unwrap());
        assert_eq!(map.size(), 1);
        map.dispose();
    }

    #[test]
    fn set_members_are_drafted_on_iteration() {
        let member = object(1);
        let set = draft(Value::set([member.clone(), Value::from(2)]))
            .as_draft()
            .unwrap();

        let members = set.set_values();
        assert!(members[0].is_draft());
        assert!(set.set_has(member.clone()));
        assert!(set.set_has(members[0].clone()));
        assert!(!set.is_modified());

        assert!(set.set_delete(member).unwrap());
        assert_eq!(set.size(), 1);
        set.dispose();
    }

    #[test]
    fn set_add_is_idempotent() {
        let set = draft(Value::set([Value::from(1)])).as_draft().unwrap();
        set.set_add(1).unwrap();
        assert!(!set.is_modified());
        set.set_add(2).unwrap();
        assert!(set.is_modified());
        assert_eq!(set.set_values(), vec![Value::from(1), Value::from(2)]);
        set.dispose();
    }

    #[test]
    fn clear_rejects_plain_objects() {
        let obj = draft(Value::object([("a", 1)])).as_draft().unwrap();
        assert!(matches!(obj.clear(), Err(DraftError::KindMismatch { .. })));
        obj.dispose();

        let map = draft(Value::map([(1, 1)])).as_draft().unwrap();
        map.clear().unwrap();
        assert_eq!(map.size(), 0);
        assert!(map.is_modified());
        map.dispose();
    }
}
