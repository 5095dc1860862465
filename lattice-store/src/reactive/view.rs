//! View Implementation
//!
//! A view is a cached derived value. It is backed by an effect whose
//! scheduler never re-runs the getter: a change only marks the view dirty,
//! and the getter runs again the next time the value is read.
//!
//! # Two signals
//!
//! - `dirty`: a slot the getter read has a new value. The next read
//!   recomputes.
//! - `might_change`: something beneath a draft the getter received was
//!   touched, or the view went dirty. Whether the value actually differs is
//!   only known after reading it.
//!
//! Effects and views that read this view depend on its identity through a
//! dedicated dep, separate from the draft slots. Going dirty notifies them
//! once; a "might change" signal is forwarded to them once per computation
//! as well, so that downstream views can report it without recomputing.
//!
//! # Reading a view from its own getter
//!
//! A getter that reaches its own view, directly or through other views,
//! gets the value of the previous computation ([`View::try_value`] returns
//! `None` on the first one). The getter never re-enters itself.
//!
//! # Writes
//!
//! Writing to a draft while a getter runs fails with
//! [`DraftError::WriteInView`](crate::DraftError::WriteInView).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::untracked;
use super::dep::TriggerOp;
use super::effect::{run_effect, stop_effect, EffectOptions, EffectRecord, ReactiveEffect};
use super::ids::{DepId, EffectId};
use super::runtime::Runtime;

/// Options for [`view_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewOptions {
    /// Run the getter on every read instead of caching.
    pub disable_cache: bool,
}

/// Shared interior for [`View<T>`].
struct ViewInner<T> {
    effect: EffectId,
    /// Dep that readers of this view subscribe to.
    dep: DepId,
    getter: Box<dyn Fn() -> T>,
    /// Cached result (None only before first computation).
    cached: RefCell<Option<T>>,
    dirty: Cell<bool>,
    might_change: Cell<bool>,
    /// A "might change" signal went downstream since the last computation.
    draft_forwarded: Cell<bool>,
    /// Bumped on each recomputation.
    version: Cell<u64>,
    disable_cache: bool,
}

impl<T> ViewInner<T> {
    fn compute(&self) {
        let value = (self.getter)();
        *self.cached.borrow_mut() = Some(value);
        self.draft_forwarded.set(false);
        self.version.set(self.version.get() + 1);
    }

    fn schedule(&self, op: TriggerOp) {
        let forward = match op {
            TriggerOp::Draft => {
                self.might_change.set(true);
                if self.draft_forwarded.replace(true) {
                    None
                } else {
                    Some(TriggerOp::Draft)
                }
            }
            _ => {
                self.might_change.set(true);
                if self.dirty.replace(true) {
                    None
                } else {
                    Some(TriggerOp::Set)
                }
            }
        };
        if let Some(op) = forward {
            Runtime::with(|rt| rt.queue_deps(&[self.dep], op));
        }
    }
}

impl<T> Drop for ViewInner<T> {
    fn drop(&mut self) {
        let released = Runtime::try_with(|rt| {
            rt.deps.remove(&self.dep);
            rt.release_effect(self.effect)
        })
        .flatten();
        if let Some(record) = released {
            record.finish_stop(self.effect);
        }
    }
}

/// A lazily evaluated, cached value derived from draft reads.
///
/// Cloning a `View` creates a new handle to the same cache. The backing
/// effect stops when the last handle is dropped.
pub struct View<T> {
    inner: Rc<ViewInner<T>>,
}

impl<T> Clone for View<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for View<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("cached", &self.inner.cached.borrow())
            .field("dirty", &self.inner.dirty.get())
            .field("might_change", &self.inner.might_change.get())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

/// Counts running getters for the duration of one recomputation.
struct ViewDepth;

impl ViewDepth {
    fn enter() -> Self {
        Runtime::with(|rt| rt.context.view_depth += 1);
        ViewDepth
    }
}

impl Drop for ViewDepth {
    fn drop(&mut self) {
        Runtime::try_with(|rt| rt.context.view_depth = rt.context.view_depth.saturating_sub(1));
    }
}

impl<T: Clone + 'static> View<T> {
    fn new(getter: Box<dyn Fn() -> T>, options: ViewOptions) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ViewInner<T>>| {
            let run = weak.clone();
            let func: Rc<dyn Fn()> = Rc::new(move || {
                if let Some(inner) = run.upgrade() {
                    inner.compute();
                }
            });
            let schedule = weak.clone();
            let scheduler = Rc::new(move |op: TriggerOp| {
                if let Some(inner) = schedule.upgrade() {
                    inner.schedule(op);
                }
            });
            let record = EffectRecord::new(
                func,
                EffectOptions {
                    scheduler: Some(scheduler),
                    ..EffectOptions::default()
                },
                true,
            );
            let (effect, dep) = Runtime::with(|rt| (rt.register_effect(record), rt.new_dep()));

            ViewInner {
                effect,
                dep,
                getter,
                cached: RefCell::new(None),
                dirty: Cell::new(true),
                might_change: Cell::new(false),
                draft_forwarded: Cell::new(false),
                version: Cell::new(0),
                disable_cache: options.disable_cache,
            }
        });
        Self { inner }
    }

    /// Get the current value, recomputing if a dependency changed.
    ///
    /// Inside an effect or another view, this subscribes the caller to the
    /// view.
    ///
    /// # Panics
    ///
    /// Panics if the getter reads its own view before it has produced a
    /// first value. Use [`View::try_value`] inside such getters.
    pub fn value(&self) -> T {
        self.try_value()
            .expect("view read from its own getter before its first value")
    }

    /// Like [`View::value`], but returns `None` instead of panicking when
    /// the getter reads its own view during its first computation.
    ///
    /// While the getter runs, reads of the view return the previous value
    /// without recomputing.
    pub fn try_value(&self) -> Option<T> {
        let inner = &self.inner;
        let (alive, running) = Runtime::with(|rt| {
            if rt.context.active_effect != Some(inner.effect) {
                rt.track_dep(inner.dep);
            }
            (
                rt.effects.contains_key(&inner.effect),
                rt.is_running(inner.effect),
            )
        });

        let stale = inner.disable_cache || inner.dirty.get() || inner.cached.borrow().is_none();
        if stale && !running {
            let _depth = ViewDepth::enter();
            if !alive || !run_effect(inner.effect) {
                // Stopped: compute without collecting dependencies.
                untracked(|| inner.compute());
            }
            inner.dirty.set(false);
        }

        inner.cached.borrow().clone()
    }

    /// The cached value, without recomputing or subscribing.
    pub fn peek(&self) -> Option<T> {
        self.inner.cached.borrow().clone()
    }
}

impl<T> View<T> {
    /// Whether the next [`View::value`] will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Whether anything the view depends on was touched since the last
    /// [`View::reset_might_change`].
    pub fn might_change(&self) -> bool {
        self.inner.might_change.get()
    }

    /// Clear the "might change" signal.
    pub fn reset_might_change(&self) {
        self.inner.might_change.set(false);
    }

    /// Number of times the getter has run.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// The effect backing this view.
    pub fn effect(&self) -> ReactiveEffect {
        ReactiveEffect::from_id(self.inner.effect)
    }

    /// Stop tracking. The cached value is kept and no longer invalidated.
    pub fn stop(&self) {
        stop_effect(self.inner.effect);
    }
}

/// Create a cached view over `getter`. The getter first runs on the first
/// read.
pub fn view<T, F>(getter: F) -> View<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    view_with(getter, ViewOptions::default())
}

/// Create a view with options.
pub fn view_with<T, F>(getter: F, options: ViewOptions) -> View<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    View::new(Box::new(getter), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use crate::reactive::runtime::run_pending_effects;

    /// A bare dep standing in for a draft slot.
    fn source() -> DepId {
        Runtime::with(|rt| rt.new_dep())
    }

    fn read(dep: DepId) {
        Runtime::with(|rt| rt.track_dep(dep));
    }

    fn change(dep: DepId, op: TriggerOp) {
        Runtime::with(|rt| rt.queue_deps(&[dep], op));
        run_pending_effects();
    }

    #[test]
    fn view_is_lazy() {
        let dep = source();
        let v = view(move || {
            read(dep);
            42
        });

        assert_eq!(v.version(), 0);
        assert!(v.is_dirty());
        assert_eq!(v.value(), 42);
        assert_eq!(v.version(), 1);
    }

    #[test]
    fn recomputes_once_per_change() {
        let dep = source();
        let v = view(move || {
            read(dep);
            1
        });
        v.value();

        change(dep, TriggerOp::Set);
        assert!(v.is_dirty());
        assert!(v.might_change());

        v.value();
        v.value();
        assert_eq!(v.version(), 2);
    }

    #[test]
    fn draft_signal_does_not_dirty() {
        let dep = source();
        let v = view(move || {
            read(dep);
            1
        });
        v.value();

        change(dep, TriggerOp::Draft);
        assert!(!v.is_dirty());
        assert!(v.might_change());

        v.reset_might_change();
        assert!(!v.might_change());
        assert_eq!(v.version(), 1);
    }

    #[test]
    fn disable_cache_always_recomputes() {
        let v = view_with(|| 1, ViewOptions { disable_cache: true });
        v.value();
        v.value();
        assert_eq!(v.version(), 2);
    }

    #[test]
    fn downstream_effect_reruns_when_view_goes_dirty() {
        let dep = source();
        let v = view(move || {
            read(dep);
            7
        });

        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let v_clone = v.clone();
        let watcher = effect(move || {
            v_clone.value();
            runs_clone.set(runs_clone.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        change(dep, TriggerOp::Set);
        assert_eq!(runs.get(), 2);
        assert_eq!(v.version(), 2);

        change(dep, TriggerOp::Draft);
        assert_eq!(runs.get(), 2);
        watcher.stop();
    }

    #[test]
    fn stopped_view_keeps_cache() {
        let dep = source();
        let v = view(move || {
            read(dep);
            3
        });
        v.value();
        v.stop();

        change(dep, TriggerOp::Set);
        assert!(!v.is_dirty());
        assert_eq!(v.value(), 3);
        assert_eq!(v.version(), 1);
    }

    #[test]
    fn self_read_returns_previous_value() {
        let dep = source();
        let slot: Rc<RefCell<Option<View<u32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let v = view(move || {
            read(dep);
            let previous = slot_clone.borrow().as_ref().and_then(View::try_value);
            previous.map_or(1, |n| n + 1)
        });
        *slot.borrow_mut() = Some(v.clone());

        assert_eq!(v.value(), 1);
        change(dep, TriggerOp::Set);
        assert_eq!(v.value(), 2);
        assert_eq!(v.version(), 2);

        // Break the handle cycle
        slot.borrow_mut().take();
    }

    #[test]
    fn mutually_reading_views_settle() {
        let dep = source();
        let a_slot: Rc<RefCell<Option<View<u32>>>> = Rc::new(RefCell::new(None));
        let a_clone = a_slot.clone();
        let b = view(move || {
            let a = a_clone.borrow().as_ref().and_then(View::try_value);
            a.unwrap_or(0) * 10
        });
        let b_clone = b.clone();
        let a = view(move || {
            read(dep);
            b_clone.value() + 1
        });
        *a_slot.borrow_mut() = Some(a.clone());

        assert_eq!(a.value(), 1);

        change(dep, TriggerOp::Draft);
        assert!(a.might_change());
        assert!(b.might_change());

        change(dep, TriggerOp::Set);
        assert_eq!(a.value(), 11);
        assert_eq!(b.value(), 10);

        a_slot.borrow_mut().take();
    }

    #[test]
    fn dropping_view_releases_effect() {
        let v = view(|| 1);
        let effect = v.effect();
        assert!(effect.is_active());
        drop(v);
        assert!(!effect.is_active());
    }
}
