//! Draft state records and the write path shared by every container kind.
//!
//! A [`DraftState`] shadows one node of the base tree. Reads go to `copy`
//! once it exists and to `base` before that. The copy is allocated by the
//! first write, or by the first read that has to hand out a child draft,
//! since the child has to be stored somewhere.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{DraftError, DraftResult};
use crate::reactive::{DepKey, DraftId, ListenerId, Runtime, TriggerOp};
use crate::value::{Container, Key, Node, NodeKind, Value};

/// Per-kind bookkeeping.
pub(crate) enum DraftKind {
    /// Objects and arrays.
    Common,
    Map,
    /// Sets draft every member when the copy is prepared. `drafted` maps
    /// each base member to its child draft.
    Set { drafted: IndexMap<Value, DraftId> },
}

/// Arena record for one drafted node.
pub(crate) struct DraftState {
    pub(crate) base: Node,
    pub(crate) copy: Option<Container>,
    pub(crate) modified: bool,
    pub(crate) parent: Option<DraftId>,
    pub(crate) root: DraftId,
    pub(crate) children: SmallVec<[DraftId; 4]>,
    pub(crate) kind: DraftKind,
    pub(crate) listeners: IndexMap<ListenerId, Rc<dyn Fn()>>,
    /// Node built by the last snapshot that found this state modified.
    pub(crate) finalized: Option<Node>,
}

impl DraftState {
    /// The container reads go to.
    #[inline]
    pub(crate) fn current(&self) -> &Container {
        self.copy.as_ref().unwrap_or_else(|| self.base.container())
    }

    /// Whether content has never diverged from `base`.
    #[inline]
    pub(crate) fn is_pristine(&self) -> bool {
        !self.modified && self.finalized.is_none()
    }
}

/// Addresses one value inside a container.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Name(Rc<str>),
    Index(usize),
    /// A map entry, by the key as stored.
    Entry(Value),
}

impl Slot {
    pub(crate) fn get<'a>(&self, container: &'a Container) -> Option<&'a Value> {
        match (self, container) {
            (Slot::Name(name), Container::Object(entries)) => entries.get(name),
            (Slot::Index(index), Container::Array(items)) => items.get(*index),
            (Slot::Entry(key), Container::Map(entries)) => entries.get(key),
            _ => None,
        }
    }

    /// Store `value`, returning the previous one. Array slots past the end
    /// pad with `Null`.
    pub(crate) fn store(&self, container: &mut Container, value: Value) -> Option<Value> {
        match (self, container) {
            (Slot::Name(name), Container::Object(entries)) => entries.insert(name.clone(), value),
            (Slot::Index(index), Container::Array(items)) => {
                if let Some(item) = items.get_mut(*index) {
                    return Some(std::mem::replace(item, value));
                }
                items.resize(*index, Value::Null);
                items.push(value);
                None
            }
            (Slot::Entry(key), Container::Map(entries)) => entries.insert(key.clone(), value),
            _ => None,
        }
    }

    pub(crate) fn remove(&self, container: &mut Container) -> Option<Value> {
        match (self, container) {
            (Slot::Name(name), Container::Object(entries)) => entries.shift_remove(name),
            (Slot::Entry(key), Container::Map(entries)) => entries.shift_remove(key),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Slot::Name(name) => format!(".{name}"),
            Slot::Index(index) => format!("[{index}]"),
            Slot::Entry(key) => format!("{key:?}"),
        }
    }
}

impl Runtime {
    /// Allocate a state for `base`, as a child of `parent` or as a new root.
    pub(crate) fn create_state(&mut self, base: Node, parent: Option<DraftId>) -> DraftId {
        let id = DraftId::next();
        let root = parent
            .and_then(|parent| self.states.get(&parent))
            .map_or(id, |parent| parent.root);
        if let Some(parent) = parent.and_then(|parent| self.states.get_mut(&parent)) {
            parent.children.push(id);
        }

        let kind = match base.kind() {
            NodeKind::Map => DraftKind::Map,
            NodeKind::Set => DraftKind::Set {
                drafted: IndexMap::new(),
            },
            NodeKind::Object | NodeKind::Array => DraftKind::Common,
        };
        debug!(draft = id.raw(), root = root.raw(), kind = base.kind().as_str(), "draft created");

        self.states.insert(
            id,
            DraftState {
                base,
                copy: None,
                modified: false,
                parent,
                root,
                children: SmallVec::new(),
                kind,
                listeners: IndexMap::new(),
                finalized: None,
            },
        );
        id
    }

    /// Allocate the shadow copy of `id` if it does not exist yet.
    pub(crate) fn prepare_copy(&mut self, id: DraftId) {
        let base = match self.states.get(&id) {
            Some(state) if state.copy.is_none() => state.base.clone(),
            _ => return,
        };

        let copy = match base.container() {
            Container::Set(members) => {
                let mut copy = IndexSet::with_capacity(members.len());
                let mut drafted = IndexMap::new();
                for member in members {
                    match member {
                        Value::Node(node) if node.is_draftable() => {
                            let child = self.create_state(node.clone(), Some(id));
                            drafted.insert(member.clone(), child);
                            copy.insert(Value::Draft(child.into()));
                        }
                        _ => {
                            copy.insert(member.clone());
                        }
                    }
                }
                if let Some(DraftKind::Set { drafted: slot }) =
                    self.states.get_mut(&id).map(|state| &mut state.kind)
                {
                    *slot = drafted;
                }
                Container::Set(copy)
            }
            other => other.clone(),
        };

        debug!(draft = id.raw(), len = copy.len(), "copy prepared");
        if let Some(state) = self.states.get_mut(&id) {
            state.copy = Some(copy);
        }
    }

    /// Mark `id` and every ancestor modified.
    pub(crate) fn mark_changed(&mut self, id: DraftId) {
        let mut current = Some(id);
        while let Some(draft) = current {
            self.prepare_copy(draft);
            let Some(state) = self.states.get_mut(&draft) else {
                break;
            };
            state.modified = true;
            current = state.parent;
        }
    }

    /// Queue watch notifications for `id` and its ancestors, and signal
    /// views holding any of them that something beneath changed.
    pub(crate) fn notify_change(&mut self, id: DraftId) {
        let mut current = Some(id);
        while let Some(draft) = current {
            let Some(state) = self.states.get(&draft) else {
                break;
            };
            let kind = state.base.kind();
            current = state.parent;
            self.queue.pending.insert(draft);
            self.trigger(draft, kind, TriggerOp::Draft, Some(DepKey::Draft));
        }
    }

    /// Fail if writes are not allowed right now.
    pub(crate) fn check_writable(
        &self,
        id: DraftId,
        describe: impl FnOnce() -> String,
    ) -> DraftResult<()> {
        if self.context.view_depth > 0 {
            return Err(DraftError::write_in_view(describe()));
        }
        if !self.states.contains_key(&id) {
            return Err(DraftError::Disposed);
        }
        Ok(())
    }

    pub(crate) fn kind_of(&self, id: DraftId) -> DraftResult<NodeKind> {
        self.states
            .get(&id)
            .map(|state| state.base.kind())
            .ok_or(DraftError::Disposed)
    }

    /// The original node behind a draft; anything else unchanged.
    pub(crate) fn base_of(&self, value: &Value) -> Value {
        match value {
            Value::Draft(draft) => self
                .states
                .get(&draft.id())
                .map_or_else(|| value.clone(), |state| Value::Node(state.base.clone())),
            other => other.clone(),
        }
    }

    pub(crate) fn slot_dep_key(&self, slot: &Slot) -> DepKey {
        match slot {
            Slot::Name(name) => DepKey::Key(Key::Name(name.clone())),
            Slot::Index(index) => DepKey::Key(Key::Index(*index)),
            Slot::Entry(key) => DepKey::Entry(self.base_of(key)),
        }
    }

    /// Turn a value read from `slot` into what the read returns. A
    /// draftable node becomes a child draft, stored back into the copy so
    /// the next read returns the same draft.
    pub(crate) fn resolve_read(&mut self, id: DraftId, slot: &Slot, value: Value) -> Value {
        match value {
            Value::Node(node) if node.is_draftable() => {
                self.prepare_copy(id);
                let child = self.create_state(node, Some(id));
                if let Some(copy) = self.states.get_mut(&id).and_then(|state| state.copy.as_mut()) {
                    slot.store(copy, Value::Draft(child.into()));
                }
                self.track_draft_ref(child);
                Value::Draft(child.into())
            }
            Value::Draft(child) => {
                self.track_draft_ref(child.id());
                Value::Draft(child)
            }
            other => other,
        }
    }

    /// Whether `value` is the base of the untouched child draft `current`.
    fn is_pristine_base(&self, current: &Value, value: &Value) -> bool {
        match (current, value) {
            (Value::Draft(child), Value::Node(node)) => self
                .states
                .get(&child.id())
                .is_some_and(|child| child.is_pristine() && child.base.ptr_eq(node)),
            _ => false,
        }
    }

    /// Write `value` into `slot` of `id`.
    pub(crate) fn write_slot(&mut self, id: DraftId, slot: Slot, value: Value) -> DraftResult<()> {
        let state = self.states.get(&id).ok_or(DraftError::Disposed)?;
        let kind = state.base.kind();
        let current = slot.get(state.current()).cloned();

        if !state.modified {
            if let Some(current) = &current {
                if current.same_value(&value) {
                    return Ok(());
                }
                if self.is_pristine_base(current, &value) {
                    if let Some(copy) = self.states.get_mut(&id).and_then(|state| state.copy.as_mut())
                    {
                        slot.store(copy, value);
                    }
                    return Ok(());
                }
            }
        }

        self.mark_changed(id);
        let copy = self
            .states
            .get_mut(&id)
            .and_then(|state| state.copy.as_mut())
            .ok_or(DraftError::Disposed)?;
        let op = match slot.store(copy, value.clone()) {
            Some(previous) if previous.same_value(&value) => return Ok(()),
            Some(_) => TriggerOp::Set,
            None => TriggerOp::Add,
        };

        debug!(draft = id.raw(), slot = %slot.describe(), ?op, "write");
        let key = self.slot_dep_key(&slot);
        self.trigger(id, kind, op, Some(key));
        self.notify_change(id);
        Ok(())
    }

    /// Remove `slot` from `id`. Returns whether it existed.
    pub(crate) fn delete_slot(&mut self, id: DraftId, slot: Slot) -> DraftResult<bool> {
        let state = self.states.get(&id).ok_or(DraftError::Disposed)?;
        let kind = state.base.kind();
        if slot.get(state.current()).is_none() {
            return Ok(false);
        }

        self.mark_changed(id);
        let removed = self
            .states
            .get_mut(&id)
            .and_then(|state| state.copy.as_mut())
            .and_then(|copy| slot.remove(copy));
        if removed.is_none() {
            return Ok(false);
        }

        debug!(draft = id.raw(), slot = %slot.describe(), "delete");
        let key = self.slot_dep_key(&slot);
        self.trigger(id, kind, TriggerOp::Delete, Some(key));
        self.notify_change(id);
        Ok(true)
    }

    /// Apply `f` to a working copy of the array `id` and commit the result.
    ///
    /// `f` sees plain values, so nothing it reads is tracked. Every index
    /// whose value changed is triggered, and a length change triggers the
    /// length plus every index past the new end.
    pub(crate) fn array_apply<R>(
        &mut self,
        id: DraftId,
        f: impl FnOnce(&mut Vec<Value>) -> R,
    ) -> DraftResult<R> {
        let state = self.states.get(&id).ok_or(DraftError::Disposed)?;
        let old = match state.current() {
            Container::Array(items) => items.clone(),
            other => return Err(DraftError::kind_mismatch("array", other.kind().as_str())),
        };

        let mut items = old.clone();
        let result = f(&mut items);
        let unchanged =
            items.len() == old.len() && items.iter().zip(&old).all(|(new, old)| new.same_value(old));
        if unchanged {
            return Ok(result);
        }

        let mut ops: SmallVec<[(usize, TriggerOp); 8]> = SmallVec::new();
        for (index, item) in items.iter().enumerate() {
            match old.get(index) {
                None => ops.push((index, TriggerOp::Add)),
                Some(previous) if !previous.same_value(item) => ops.push((index, TriggerOp::Set)),
                Some(_) => {}
            }
        }
        let new_len = items.len();

        self.mark_changed(id);
        if let Some(state) = self.states.get_mut(&id) {
            state.copy = Some(Container::Array(items));
        }

        debug!(draft = id.raw(), old_len = old.len(), new_len, "array rewrite");
        for (index, op) in ops {
            self.trigger(id, NodeKind::Array, op, Some(DepKey::Key(Key::Index(index))));
        }
        if new_len != old.len() {
            self.trigger_length(id, new_len);
        }
        self.notify_change(id);
        Ok(result)
    }

    /// Current content of `id` with every nested draft resolved, without
    /// tracking or drafting anything.
    pub(crate) fn latest_value(&self, id: DraftId) -> Option<Value> {
        let state = self.states.get(&id)?;
        if !state.modified {
            let node = state.finalized.as_ref().unwrap_or(&state.base);
            return Some(Value::Node(node.clone()));
        }
        let copy = state.copy.as_ref()?;
        Some(Value::Node(Node::new(self.latest_container(copy))))
    }

    fn latest_container(&self, container: &Container) -> Container {
        let latest = |value: &Value| match value {
            Value::Draft(draft) => self.latest_value(draft.id()).unwrap_or(Value::Null),
            other => other.clone(),
        };
        match container {
            Container::Object(entries) => Container::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), latest(value)))
                    .collect(),
            ),
            Container::Array(items) => Container::Array(items.iter().map(latest).collect()),
            Container::Map(entries) => Container::Map(
                entries
                    .iter()
                    .map(|(key, value)| (latest(key), latest(value)))
                    .collect(),
            ),
            Container::Set(members) => Container::Set(members.iter().map(latest).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(entries: &[(&str, Value)]) -> Node {
        Node::new(Container::Object(
            entries
                .iter()
                .map(|(key, value)| (Rc::from(*key), value.clone()))
                .collect(),
        ))
    }

    #[test]
    fn slots_store_and_remove() {
        let mut container = Container::Array(vec![Value::from(1)]);
        assert_eq!(Slot::Index(0).store(&mut container, Value::from(2)), Some(Value::from(1)));
        assert_eq!(Slot::Index(2).store(&mut container, Value::from(3)), None);
        assert_eq!(container.len(), 3);
        assert_eq!(Slot::Index(1).get(&container), Some(&Value::Null));
        assert_eq!(Slot::Index(1).remove(&mut container), None);

        let mut container = object(&[("a", Value::from(1))]).container().clone();
        assert_eq!(Slot::Name("a".into()).remove(&mut container), Some(Value::from(1)));
        assert!(container.is_empty());
    }

    #[test]
    fn children_share_the_root() {
        Runtime::with(|rt| {
            let root = rt.create_state(object(&[]), None);
            let child = rt.create_state(object(&[]), Some(root));
            let grandchild = rt.create_state(object(&[]), Some(child));

            assert_eq!(rt.states[&grandchild].root, root);
            assert_eq!(rt.states[&child].parent, Some(root));
            assert_eq!(rt.states[&root].children.as_slice(), &[child]);
        });
    }

    #[test]
    fn mark_changed_reaches_every_ancestor() {
        Runtime::with(|rt| {
            let root = rt.create_state(object(&[]), None);
            let child = rt.create_state(object(&[]), Some(root));
            rt.mark_changed(child);

            assert!(rt.states[&child].modified);
            assert!(rt.states[&root].modified);
            assert!(rt.states[&root].copy.is_some());
        });
    }

    #[test]
    fn set_copy_drafts_members() {
        let member = object(&[("x", Value::from(1))]);
        let set = Node::new(Container::Set(
            [Value::Node(member.clone()), Value::from(2)].into_iter().collect(),
        ));
        Runtime::with(|rt| {
            let id = rt.create_state(set, None);
            rt.prepare_copy(id);

            let state = &rt.states[&id];
            let DraftKind::Set { drafted } = &state.kind else {
                panic!("expected set state");
            };
            let child = drafted[&Value::Node(member)];
            let Some(Container::Set(copy)) = &state.copy else {
                panic!("expected set copy");
            };
            assert!(copy.contains(&Value::Draft(child.into())));
            assert!(copy.contains(&Value::from(2)));
        });
    }

    #[test]
    fn equal_write_does_not_copy() {
        Runtime::with(|rt| {
            let id = rt.create_state(object(&[("a", Value::from(1))]), None);
            rt.write_slot(id, Slot::Name("a".into()), Value::from(1)).unwrap();
            assert!(rt.states[&id].copy.is_none());
            assert!(!rt.states[&id].modified);

            rt.write_slot(id, Slot::Name("a".into()), Value::from(2)).unwrap();
            assert!(rt.states[&id].modified);
            rt.queue.pending.clear();
        });
    }
}
