//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when a draft slot is read, the
//! runtime links the current effect to that slot.
//!
//! # Implementation
//!
//! Running an effect enters a [`ReactiveContext`]: the effect becomes
//! active, its parent link points at the previously active effect, and the
//! per-depth tracking bit moves one position up. Dropping the guard
//! reconciles the dependencies collected during the run and restores the
//! previous effect, even if the effect body panics.
//!
//! Tracking itself can be paused and resumed independently of the active
//! effect. Pauses nest: [`reset_tracking`] restores whatever state was in
//! effect before the matching [`pause_tracking`] or [`enable_tracking`].

use super::ids::{EffectId, ScopeId};
use super::runtime::Runtime;

/// Per-thread tracking state.
#[derive(Debug)]
pub(crate) struct TrackingContext {
    /// The innermost running effect.
    pub(crate) active_effect: Option<EffectId>,

    /// Whether reads are currently recorded.
    pub(crate) should_track: bool,

    /// Saved `should_track` values for nested pause/enable calls.
    pub(crate) track_stack: Vec<bool>,

    /// Number of effects currently running.
    pub(crate) depth: u32,

    /// Marker bit of the innermost running effect.
    pub(crate) op_bit: u32,

    /// Number of view getters currently running. Writes fail while non-zero.
    pub(crate) view_depth: u32,

    /// Scope that newly created effects are registered with.
    pub(crate) active_scope: Option<ScopeId>,
}

impl Default for TrackingContext {
    fn default() -> Self {
        Self {
            active_effect: None,
            should_track: true,
            track_stack: Vec::new(),
            depth: 0,
            op_bit: 1,
            view_depth: 0,
            active_scope: None,
        }
    }
}

/// Guard for one effect run.
///
/// Created by [`ReactiveContext::enter`]; the run ends when it is dropped.
pub(crate) struct ReactiveContext {
    effect: EffectId,
    previous: Option<EffectId>,
    last_should_track: bool,
}

impl ReactiveContext {
    /// Make `effect` the active effect.
    ///
    /// Returns `None` if `effect` is already running further up the stack:
    /// an effect never re-enters itself.
    pub(crate) fn enter(effect: EffectId) -> Option<Self> {
        Runtime::with(|rt| {
            let mut parent = rt.context.active_effect;
            while let Some(running) = parent {
                if running == effect {
                    if rt.config.dev_warnings {
                        tracing::warn!(effect = effect.raw(), "skipped recursive effect run");
                    }
                    return None;
                }
                parent = rt.effects.get(&running).and_then(|record| record.parent);
            }

            let previous = rt.context.active_effect;
            let record = rt.effects.get_mut(&effect)?;
            record.parent = previous;

            let last_should_track = rt.context.should_track;
            rt.context.active_effect = Some(effect);
            rt.context.should_track = true;
            rt.context.depth += 1;
            rt.context.op_bit = Runtime::marker_bit(rt.context.depth);

            if rt.context.depth <= rt.config.marker_bits() {
                rt.init_dep_markers(effect);
            } else {
                rt.cleanup_effect(effect);
            }

            Some(Self {
                effect,
                previous,
                last_should_track,
            })
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let released = Runtime::try_with(|rt| {
            if rt.context.depth <= rt.config.marker_bits() {
                rt.finalize_dep_markers(self.effect);
            }
            rt.context.depth = rt.context.depth.saturating_sub(1);
            rt.context.op_bit = Runtime::marker_bit(rt.context.depth);
            rt.context.active_effect = self.previous;
            rt.context.should_track = self.last_should_track;

            let defer_stop = match rt.effects.get_mut(&self.effect) {
                Some(record) => {
                    record.parent = None;
                    record.defer_stop
                }
                None => false,
            };
            if defer_stop {
                rt.release_effect(self.effect)
            } else {
                None
            }
        })
        .flatten();

        if let Some(record) = released {
            record.finish_stop(self.effect);
        }
    }
}

/// Stop recording reads until the matching [`reset_tracking`].
pub fn pause_tracking() {
    Runtime::with(|rt| {
        rt.context.track_stack.push(rt.context.should_track);
        rt.context.should_track = false;
    });
}

/// Record reads again until the matching [`reset_tracking`].
pub fn enable_tracking() {
    Runtime::with(|rt| {
        rt.context.track_stack.push(rt.context.should_track);
        rt.context.should_track = true;
    });
}

/// Undo the most recent [`pause_tracking`] or [`enable_tracking`].
pub fn reset_tracking() {
    Runtime::with(|rt| {
        rt.context.should_track = rt.context.track_stack.pop().unwrap_or(true);
    });
}

/// Whether reads made now would be recorded.
pub fn is_tracking() -> bool {
    Runtime::with(|rt| rt.context.should_track && rt.context.active_effect.is_some())
}

/// Run `f` without recording any of its reads.
///
/// Tracking is restored even if `f` panics.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct Reset;
    impl Drop for Reset {
        fn drop(&mut self) {
            Runtime::try_with(|rt| {
                rt.context.should_track = rt.context.track_stack.pop().unwrap_or(true);
            });
        }
    }

    pause_tracking();
    let _reset = Reset;
    f()
}
