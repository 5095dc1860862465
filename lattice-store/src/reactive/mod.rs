//! Reactive Primitives
//!
//! This module implements the dependency-tracking half of the engine:
//! deps, effects, scopes, views and the notification queue. Drafts feed it
//! reads and writes; it decides what has to run again.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A dep is the subscriber set of one trackable slot: a property of a
//! draft, its iteration order, or the identity of a view.
//!
//! ## Effects
//!
//! An effect is a computation that runs whenever a slot it read changes.
//! While an effect runs it is the *active* effect, and every draft read is
//! attributed to it.
//!
//! ## Views
//!
//! A view is a cached derived value. It is backed by an effect that only
//! marks the view dirty; the getter runs again when the value is read.
//!
//! ## Scopes
//!
//! A scope collects the effects created while it runs, so they can be
//! stopped together.
//!
//! # Implementation Notes
//!
//! All state lives in a thread-local runtime addressed by ids, so handles
//! are `Copy` and nothing is reference counted across the graph. Dependency
//! reconciliation uses one bit per nesting depth, as in Vue 3.

mod context;
mod dep;
mod effect;
mod ids;
mod runtime;
mod scheduler;
mod scope;
mod view;

pub use context::{enable_tracking, is_tracking, pause_tracking, reset_tracking, untracked};
pub use dep::{DepKey, TrackOp, TriggerOp};
pub use effect::{effect, effect_with, EffectOptions, ReactiveEffect, Scheduler};
pub use ids::{DepId, DraftId, EffectId, ListenerId, ScopeId};
pub use scheduler::{batch, flush, has_pending};
pub use scope::{current_scope, on_scope_dispose, EffectScope};
pub use view::{view, view_with, View, ViewOptions};

pub(crate) use runtime::Runtime;
pub(crate) use scheduler::after_mutation;
