//! Effect Implementation
//!
//! An effect is a re-runnable computation. While it runs, every draft read
//! is attributed to it; when one of those slots changes, the effect is
//! triggered again.
//!
//! # How Effects Work
//!
//! 1. [`effect`] runs its function immediately to establish initial
//!    dependencies. [`ReactiveEffect::new`] creates the effect without
//!    running it.
//!
//! 2. When any dependency changes, the effect either re-runs or, if it has a
//!    scheduler, calls the scheduler with the kind of change instead.
//!
//! 3. Each run reconciles dependencies: slots read again are kept, slots no
//!    longer read are dropped (see [`super::dep`]).
//!
//! # Recursion
//!
//! An effect that triggers itself while running is skipped unless it was
//! created with `allow_recurse`. An effect never re-enters itself through
//! nested runs.
//!
//! # Stopping
//!
//! Stopping is immediate and irreversible: the effect is unlinked from
//! every dep and its record is released. Stopping an effect from inside its
//! own run defers the release until the run ends.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::debug;

use super::context::ReactiveContext;
use super::dep::TriggerOp;
use super::ids::{DepId, EffectId};
use super::runtime::Runtime;

/// Scheduler callback: receives the kind of change instead of re-running.
pub type Scheduler = Rc<dyn Fn(TriggerOp)>;

/// Options for [`ReactiveEffect::new`] and [`effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    /// Called on trigger instead of re-running the effect.
    pub scheduler: Option<Scheduler>,

    /// Let the effect be triggered by its own writes.
    pub allow_recurse: bool,

    /// Do not run on creation ([`effect_with`] only).
    pub lazy: bool,

    /// Called once when the effect is stopped.
    pub on_stop: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("scheduler", &self.scheduler.is_some())
            .field("allow_recurse", &self.allow_recurse)
            .field("lazy", &self.lazy)
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// Arena record for one effect.
pub(crate) struct EffectRecord {
    pub(crate) func: Rc<dyn Fn()>,
    pub(crate) scheduler: Option<Scheduler>,
    /// Deps this effect is linked to, for cleanup.
    pub(crate) deps: SmallVec<[DepId; 8]>,
    /// Effect that was active when this one started running.
    pub(crate) parent: Option<EffectId>,
    pub(crate) allow_recurse: bool,
    pub(crate) defer_stop: bool,
    pub(crate) is_view: bool,
    pub(crate) on_stop: Option<Box<dyn FnOnce()>>,
}

impl EffectRecord {
    pub(crate) fn new(func: Rc<dyn Fn()>, options: EffectOptions, is_view: bool) -> Self {
        Self {
            func,
            scheduler: options.scheduler,
            deps: SmallVec::new(),
            parent: None,
            allow_recurse: options.allow_recurse,
            defer_stop: false,
            is_view,
            on_stop: options.on_stop,
        }
    }

    /// Complete a stop after the record left the arena. Runs outside the
    /// runtime borrow, since `on_stop` and the dropped closures are user code.
    pub(crate) fn finish_stop(mut self, id: EffectId) {
        debug!(effect = id.raw(), "effect stopped");
        if let Some(on_stop) = self.on_stop.take() {
            on_stop();
        }
    }
}

impl Runtime {
    /// Register a new effect with the active scope.
    pub(crate) fn register_effect(&mut self, record: EffectRecord) -> EffectId {
        let id = EffectId::next();
        self.effects.insert(id, record);
        self.record_in_scope(id);
        id
    }

    /// Mark every current dep as "was tracked" at the current depth.
    pub(crate) fn init_dep_markers(&mut self, effect: EffectId) {
        let bit = self.context.op_bit;
        let Some(record) = self.effects.get(&effect) else {
            return;
        };
        for dep in &record.deps {
            if let Some(dep) = self.deps.get_mut(dep) {
                dep.w |= bit;
            }
        }
    }

    /// Drop deps that were tracked before the run but not during it, and
    /// clear the current depth's markers.
    pub(crate) fn finalize_dep_markers(&mut self, effect: EffectId) {
        let bit = self.context.op_bit;
        let Some(record) = self.effects.get_mut(&effect) else {
            return;
        };
        let mut kept = SmallVec::new();
        for dep_id in record.deps.drain(..) {
            let Some(dep) = self.deps.get_mut(&dep_id) else {
                continue;
            };
            if dep.was_tracked(bit) && !dep.new_tracked(bit) {
                dep.effects.shift_remove(&effect);
            } else {
                kept.push(dep_id);
            }
            dep.w &= !bit;
            dep.n &= !bit;
        }
        record.deps = kept;
    }

    /// Unlink `effect` from every dep it holds.
    pub(crate) fn cleanup_effect(&mut self, effect: EffectId) {
        let Some(record) = self.effects.get_mut(&effect) else {
            return;
        };
        for dep_id in record.deps.drain(..) {
            if let Some(dep) = self.deps.get_mut(&dep_id) {
                dep.effects.shift_remove(&effect);
            }
        }
    }

    /// Unlink and remove `effect`. The caller drops the record outside the
    /// runtime borrow.
    pub(crate) fn release_effect(&mut self, effect: EffectId) -> Option<EffectRecord> {
        self.cleanup_effect(effect);
        self.forget_pending(effect);
        self.effects.remove(&effect)
    }

    /// Whether `effect` is running anywhere on the effect stack.
    pub(crate) fn is_running(&self, effect: EffectId) -> bool {
        let mut current = self.context.active_effect;
        while let Some(running) = current {
            if running == effect {
                return true;
            }
            current = self.effects.get(&running).and_then(|record| record.parent);
        }
        false
    }
}

/// Run `effect` inside a reactive context.
///
/// Returns false if the effect no longer exists or is already running.
pub(crate) fn run_effect(effect: EffectId) -> bool {
    let Some(func) = Runtime::with(|rt| rt.effects.get(&effect).map(|record| record.func.clone()))
    else {
        return false;
    };
    let Some(_context) = ReactiveContext::enter(effect) else {
        return false;
    };
    func();
    true
}

/// Deliver one trigger to `effect`: call its scheduler, or re-run it.
pub(crate) fn trigger_effect(effect: EffectId, op: TriggerOp) {
    enum Action {
        Schedule(Scheduler),
        Run,
    }

    let action = Runtime::with(|rt| {
        let record = rt.effects.get(&effect)?;
        if rt.context.active_effect == Some(effect) && !record.allow_recurse {
            return None;
        }
        match &record.scheduler {
            Some(scheduler) => Some(Action::Schedule(Rc::clone(scheduler))),
            None if op.is_value_change() => Some(Action::Run),
            None => None,
        }
    });

    match action {
        Some(Action::Schedule(scheduler)) => scheduler(op),
        Some(Action::Run) => {
            run_effect(effect);
        }
        None => {}
    }
}

/// Stop `effect`. Deferred to the end of the run if it is running.
pub(crate) fn stop_effect(effect: EffectId) {
    let released = Runtime::with(|rt| {
        if rt.is_running(effect) {
            if let Some(record) = rt.effects.get_mut(&effect) {
                record.defer_stop = true;
            }
            return None;
        }
        rt.release_effect(effect)
    });
    if let Some(record) = released {
        record.finish_stop(effect);
    }
}

/// Handle to a reactive effect.
///
/// Handles are plain ids: dropping one does not stop the effect. Call
/// [`ReactiveEffect::stop`], or stop the scope the effect was created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReactiveEffect {
    id: EffectId,
}

impl ReactiveEffect {
    /// Create an effect without running it.
    pub fn new<F>(f: F, options: EffectOptions) -> Self
    where
        F: Fn() + 'static,
    {
        let record = EffectRecord::new(Rc::new(f), options, false);
        Self::from_id(Runtime::with(|rt| rt.register_effect(record)))
    }

    pub(crate) fn from_id(id: EffectId) -> Self {
        Self { id }
    }

    /// The effect's id.
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Run the effect now, re-collecting its dependencies.
    ///
    /// Does nothing if the effect was stopped or is already running.
    pub fn run(&self) {
        run_effect(self.id);
    }

    /// Stop the effect permanently.
    pub fn stop(&self) {
        stop_effect(self.id);
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        Runtime::with(|rt| {
            rt.effects
                .get(&self.id)
                .is_some_and(|record| !record.defer_stop)
        })
    }

    /// Number of deps the effect is currently linked to.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| rt.effects.get(&self.id).map_or(0, |record| record.deps.len()))
    }
}

/// Create an effect and run it immediately.
pub fn effect<F>(f: F) -> ReactiveEffect
where
    F: Fn() + 'static,
{
    effect_with(f, EffectOptions::default())
}

/// Create an effect with options; runs immediately unless `lazy` is set.
pub fn effect_with<F>(f: F, options: EffectOptions) -> ReactiveEffect
where
    F: Fn() + 'static,
{
    let lazy = options.lazy;
    let effect = ReactiveEffect::new(f, options);
    if !lazy {
        effect.run();
    }
    effect
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        (count, move || count_clone.set(count_clone.get() + 1))
    }

    #[test]
    fn effect_runs_on_creation() {
        let (count, bump) = counter();
        let effect = effect(bump);

        // Effect should have run once on creation
        assert_eq!(count.get(), 1);
        effect.stop();
    }

    #[test]
    fn lazy_effect_does_not_run_on_creation() {
        let (count, bump) = counter();
        let effect = effect_with(
            bump,
            EffectOptions {
                lazy: true,
                ..EffectOptions::default()
            },
        );

        assert_eq!(count.get(), 0);

        // Manually run
        effect.run();
        assert_eq!(count.get(), 1);
        effect.stop();
    }

    #[test]
    fn effect_does_not_run_after_stop() {
        let (count, bump) = counter();
        let effect = effect(bump);
        assert_eq!(count.get(), 1);

        effect.stop();
        assert!(!effect.is_active());

        effect.run();
        trigger_effect(effect.id(), TriggerOp::Set);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn on_stop_runs_once() {
        let (stops, on_stop) = counter();
        let effect = effect_with(
            || {},
            EffectOptions {
                on_stop: Some(Box::new(on_stop)),
                ..EffectOptions::default()
            },
        );

        effect.stop();
        effect.stop();
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn scheduler_replaces_rerun() {
        let (runs, bump) = counter();
        let seen = Rc::new(Cell::new(None));
        let seen_clone = seen.clone();
        let effect = effect_with(
            bump,
            EffectOptions {
                scheduler: Some(Rc::new(move |op| seen_clone.set(Some(op)))),
                ..EffectOptions::default()
            },
        );

        trigger_effect(effect.id(), TriggerOp::Add);
        assert_eq!(runs.get(), 1);
        assert_eq!(seen.get(), Some(TriggerOp::Add));
        effect.stop();
    }

    #[test]
    fn draft_op_does_not_rerun_plain_effects() {
        let (runs, bump) = counter();
        let effect = effect(bump);

        trigger_effect(effect.id(), TriggerOp::Draft);
        assert_eq!(runs.get(), 1);
        effect.stop();
    }

    #[test]
    fn stop_inside_run_is_deferred() {
        let holder: Rc<Cell<Option<ReactiveEffect>>> = Rc::new(Cell::new(None));
        let holder_clone = holder.clone();
        let effect = ReactiveEffect::new(
            move || {
                if let Some(me) = holder_clone.get() {
                    me.stop();
                    assert!(!me.is_active());
                }
            },
            EffectOptions::default(),
        );
        holder.set(Some(effect));

        effect.run();
        assert!(!effect.is_active());
        assert_eq!(Runtime::with(|rt| rt.context.depth), 0);
    }
}
