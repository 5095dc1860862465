//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects drafts, effects and
//! views. It owns every arena the engine needs and implements the
//! track/trigger protocol.
//!
//! # How It Works
//!
//! 1. When a draft slot is read while an effect is running, the runtime
//!    links the effect to the [`Dep`] for `(draft, slot)`.
//!
//! 2. When a draft slot changes, the runtime:
//!    a. Collects the deps affected by the change kind
//!    b. Queues their effects, views first
//!    c. Runs the queue once the mutation has released the runtime
//!
//! 3. Views never re-run from the queue. Their scheduler only marks them
//!    dirty; they recompute on next read.
//!
//! # Threading
//!
//! The runtime is thread-local and single-threaded. Every public operation
//! borrows it briefly and never holds the borrow across user code: effect
//! bodies, schedulers, listeners and disposal callbacks all run after the
//! borrow is released.

use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::context::TrackingContext;
use super::dep::{Dep, DepKey, TrackOp, TriggerOp};
use super::effect::EffectRecord;
use super::ids::{DepId, DraftId, EffectId, ScopeId};
use super::scheduler::NotifyQueue;
use super::scope::ScopeRecord;
use crate::config::EngineConfig;
use crate::draft::DraftState;
use crate::value::{Key, NodeKind};

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// The per-thread reactive runtime.
pub(crate) struct Runtime {
    pub(crate) config: EngineConfig,

    /// Draft states, addressed by id.
    pub(crate) states: HashMap<DraftId, DraftState>,

    /// Per-draft dep lookup. Dropped wholesale when a draft is disposed.
    pub(crate) target_map: HashMap<DraftId, HashMap<DepKey, DepId>>,

    pub(crate) deps: HashMap<DepId, Dep>,
    pub(crate) effects: HashMap<EffectId, EffectRecord>,
    pub(crate) scopes: HashMap<ScopeId, ScopeRecord>,
    pub(crate) context: TrackingContext,
    pub(crate) queue: NotifyQueue,

    /// Effects triggered by the current mutation, with the strongest op seen.
    pending_effects: IndexMap<EffectId, TriggerOp>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            states: HashMap::new(),
            target_map: HashMap::new(),
            deps: HashMap::new(),
            effects: HashMap::new(),
            scopes: HashMap::new(),
            context: TrackingContext::default(),
            queue: NotifyQueue::default(),
            pending_effects: IndexMap::new(),
        }
    }

    /// Run `f` with exclusive access to this thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
        RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
    }

    /// Like [`Runtime::with`], but gives up instead of panicking when the
    /// runtime is already borrowed or being torn down. Used from `Drop`.
    pub(crate) fn try_with<R>(f: impl FnOnce(&mut Runtime) -> R) -> Option<R> {
        RUNTIME
            .try_with(|rt| rt.try_borrow_mut().ok().map(|mut rt| f(&mut rt)))
            .ok()
            .flatten()
    }

    /// Allocate a dep that no draft owns (a view's identity dep).
    pub(crate) fn new_dep(&mut self) -> DepId {
        let id = DepId::next();
        self.deps.insert(id, Dep::default());
        id
    }

    /// Bit of the current effect depth, zero beyond the marker range.
    #[inline]
    pub(crate) fn marker_bit(depth: u32) -> u32 {
        1u32.checked_shl(depth).unwrap_or(0)
    }

    /// Link the active effect to the dep for `(target, key)`.
    pub(crate) fn track(&mut self, target: DraftId, op: TrackOp, key: DepKey) {
        if !self.context.should_track {
            return;
        }
        let Some(effect) = self.context.active_effect else {
            return;
        };
        let deps = &mut self.deps;
        let dep = *self
            .target_map
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_insert_with(|| {
                let id = DepId::next();
                deps.insert(id, Dep::default());
                id
            });
        trace!(draft = target.raw(), ?op, ?key, effect = effect.raw(), "track");
        self.track_effects(dep, effect);
    }

    /// Link the active effect to a standalone dep.
    pub(crate) fn track_dep(&mut self, dep: DepId) {
        if !self.context.should_track {
            return;
        }
        if let Some(effect) = self.context.active_effect {
            self.track_effects(dep, effect);
        }
    }

    /// A read returned the draft `child`. Views subscribe to changes
    /// anywhere beneath it so they can report "might change".
    pub(crate) fn track_draft_ref(&mut self, child: DraftId) {
        let Some(effect) = self.context.active_effect else {
            return;
        };
        if self.effects.get(&effect).is_some_and(|record| record.is_view) {
            self.track(child, TrackOp::Get, DepKey::Draft);
        }
    }

    fn track_effects(&mut self, dep_id: DepId, effect: EffectId) {
        let within_markers = self.context.depth <= self.config.marker_bits();
        let bit = self.context.op_bit;
        let Some(dep) = self.deps.get_mut(&dep_id) else {
            return;
        };

        let should_link = if within_markers {
            if dep.new_tracked(bit) {
                false
            } else {
                dep.n |= bit;
                !dep.was_tracked(bit)
            }
        } else {
            !dep.effects.contains(&effect)
        };

        if should_link {
            dep.effects.insert(effect);
            if let Some(record) = self.effects.get_mut(&effect) {
                record.deps.push(dep_id);
            }
        }
    }

    /// Queue the effects affected by `op` on `key` of `target`.
    pub(crate) fn trigger(
        &mut self,
        target: DraftId,
        kind: NodeKind,
        op: TriggerOp,
        key: Option<DepKey>,
    ) {
        let Some(dep_map) = self.target_map.get(&target) else {
            return;
        };

        let mut hits: SmallVec<[DepId; 4]> = SmallVec::new();
        if op == TriggerOp::Clear {
            hits.extend(dep_map.values().copied());
        } else {
            if let Some(dep) = key.as_ref().and_then(|key| dep_map.get(key)) {
                hits.push(*dep);
            }
            let mut extra = |key: DepKey| {
                if let Some(dep) = dep_map.get(&key) {
                    hits.push(*dep);
                }
            };
            match (op, kind) {
                (TriggerOp::Add, NodeKind::Array) => {
                    if matches!(key, Some(DepKey::Key(Key::Index(_)))) {
                        extra(DepKey::Length);
                    }
                }
                (TriggerOp::Add | TriggerOp::Delete, NodeKind::Map) => {
                    extra(DepKey::Iterate);
                    extra(DepKey::MapKeyIterate);
                }
                (TriggerOp::Add | TriggerOp::Delete, NodeKind::Object | NodeKind::Set) => {
                    extra(DepKey::Iterate);
                }
                (TriggerOp::Set, NodeKind::Map) => extra(DepKey::Iterate),
                _ => {}
            }
        }

        trace!(draft = target.raw(), ?op, ?key, deps = hits.len(), "trigger");
        self.queue_deps(&hits, op);
    }

    /// Queue the effects affected by an array shrinking or growing to
    /// `new_len`: the length itself and every index at or past it.
    pub(crate) fn trigger_length(&mut self, target: DraftId, new_len: usize) {
        let Some(dep_map) = self.target_map.get(&target) else {
            return;
        };
        let hits: SmallVec<[DepId; 4]> = dep_map
            .iter()
            .filter(|(key, _)| match key {
                DepKey::Length => true,
                DepKey::Key(Key::Index(index)) => *index >= new_len,
                _ => false,
            })
            .map(|(_, dep)| *dep)
            .collect();
        trace!(draft = target.raw(), new_len, deps = hits.len(), "trigger length");
        self.queue_deps(&hits, TriggerOp::Set);
    }

    /// Queue every effect subscribed to `deps`.
    pub(crate) fn queue_deps(&mut self, deps: &[DepId], op: TriggerOp) {
        for dep_id in deps {
            let Some(dep) = self.deps.get(dep_id) else {
                continue;
            };
            for effect in &dep.effects {
                self.pending_effects
                    .entry(*effect)
                    .and_modify(|queued| {
                        if !queued.is_value_change() {
                            *queued = op;
                        }
                    })
                    .or_insert(op);
            }
        }
    }

    /// Drain the queued effects, views first so that plain effects which
    /// read them observe the dirty flag.
    pub(crate) fn take_pending_effects(&mut self) -> Vec<(EffectId, TriggerOp)> {
        let pending = std::mem::take(&mut self.pending_effects);
        let (mut views, others): (Vec<_>, Vec<_>) = pending.into_iter().partition(|(id, _)| {
            self.effects.get(id).is_some_and(|record| record.is_view)
        });
        views.extend(others);
        views
    }

    /// Remove `effect` from the queue of the current mutation.
    pub(crate) fn forget_pending(&mut self, effect: EffectId) {
        self.pending_effects.shift_remove(&effect);
    }

    /// Drop every dep owned by `target`.
    pub(crate) fn drop_deps_of(&mut self, target: DraftId) {
        if let Some(dep_map) = self.target_map.remove(&target) {
            for dep in dep_map.into_values() {
                self.deps.remove(&dep);
            }
        }
    }

    /// Number of effects subscribed to `(target, key)`.
    pub(crate) fn subscriber_count(&self, target: DraftId, key: &DepKey) -> usize {
        self.target_map
            .get(&target)
            .and_then(|deps| deps.get(key))
            .and_then(|dep| self.deps.get(dep))
            .map_or(0, |dep| dep.effects.len())
    }
}

/// Run every queued effect until the queue stays empty.
pub(crate) fn run_pending_effects() {
    loop {
        let batch = Runtime::with(|rt| rt.take_pending_effects());
        if batch.is_empty() {
            break;
        }
        for (effect, op) in batch {
            super::effect::trigger_effect(effect, op);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{EffectOptions, ReactiveEffect};

    fn lazy_effect() -> ReactiveEffect {
        ReactiveEffect::new(|| {}, EffectOptions::default())
    }

    #[test]
    fn track_requires_active_effect() {
        let target = DraftId::next();
        Runtime::with(|rt| rt.track(target, TrackOp::Get, DepKey::Iterate));
        let count = Runtime::with(|rt| rt.subscriber_count(target, &DepKey::Iterate));
        assert_eq!(count, 0);
    }

    #[test]
    fn trigger_fans_out_to_iteration_on_add() {
        let effect = lazy_effect();
        let target = DraftId::next();

        Runtime::with(|rt| {
            rt.context.active_effect = Some(effect.id());
            rt.track(target, TrackOp::Iterate, DepKey::Iterate);
            rt.context.active_effect = None;

            rt.trigger(
                target,
                NodeKind::Object,
                TriggerOp::Add,
                Some(DepKey::Key(Key::from("x"))),
            );
            let queued = rt.take_pending_effects();
            assert_eq!(queued, vec![(effect.id(), TriggerOp::Add)]);
        });
        effect.stop();
    }

    #[test]
    fn set_does_not_touch_iteration_on_objects() {
        let effect = lazy_effect();
        let target = DraftId::next();

        Runtime::with(|rt| {
            rt.context.active_effect = Some(effect.id());
            rt.track(target, TrackOp::Iterate, DepKey::Iterate);
            rt.context.active_effect = None;

            rt.trigger(
                target,
                NodeKind::Object,
                TriggerOp::Set,
                Some(DepKey::Key(Key::from("x"))),
            );
            assert!(rt.take_pending_effects().is_empty());
        });
        effect.stop();
    }

    #[test]
    fn length_change_reaches_truncated_indices_only() {
        let low = lazy_effect();
        let high = lazy_effect();
        let target = DraftId::next();

        Runtime::with(|rt| {
            rt.context.active_effect = Some(low.id());
            rt.track(target, TrackOp::Get, DepKey::Key(Key::Index(0)));
            rt.context.active_effect = Some(high.id());
            rt.track(target, TrackOp::Get, DepKey::Key(Key::Index(5)));
            rt.context.active_effect = None;

            rt.trigger_length(target, 2);
            let queued = rt.take_pending_effects();
            assert_eq!(queued, vec![(high.id(), TriggerOp::Set)]);
        });
        low.stop();
        high.stop();
    }

    #[test]
    fn draft_op_is_upgraded_by_value_change() {
        let effect = lazy_effect();
        let dep = Runtime::with(|rt| rt.new_dep());

        Runtime::with(|rt| {
            rt.context.active_effect = Some(effect.id());
            rt.track_dep(dep);
            rt.context.active_effect = None;

            rt.queue_deps(&[dep], TriggerOp::Draft);
            rt.queue_deps(&[dep], TriggerOp::Set);
            assert_eq!(rt.take_pending_effects(), vec![(effect.id(), TriggerOp::Set)]);
        });
        effect.stop();
    }
}
