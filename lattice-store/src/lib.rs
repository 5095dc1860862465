//! Lattice Store
//!
//! This crate provides the state engine behind Lattice stores: mutable
//! drafts over immutable data trees, fine-grained dependency tracking, cached
//! views and structurally shared snapshots.
//!
//! It implements:
//!
//! - Drafts over objects, arrays, ordered maps and ordered sets, with lazy
//!   shadow copies
//! - Per-property dependency tracking and re-runnable effects
//! - Views: cached derived values that recompute only when something they
//!   read changed value
//! - Snapshots that share every unmodified subtree with the original
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: The plain data tree (`Value`, `Node`, `Container`, `Key`)
//! - `reactive`: Deps, effects, scopes, views and the notification queue
//! - `draft`: Draft handles and the read/write interception layer
//! - `snapshot`: Turning a draft tree back into plain nodes
//! - `config`, `error`: Engine configuration and error types
//!
//! The engine is single-threaded. All state lives in a thread-local
//! runtime, and every handle (`Draft`, `ReactiveEffect`, `EffectScope`) is a
//! plain id into it.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_store::{draft, snapshot, view, Value};
//! use serde_json::json;
//!
//! let base = Value::from(json!({ "a": { "b": 1 }, "c": [1] }));
//! let state = draft(base.clone()).as_draft().unwrap();
//!
//! // A view over `a.b` only
//! let b = view(move || {
//!     let a = state.get("a").and_then(|a| a.as_draft()).unwrap();
//!     a.get("b").and_then(|b| b.as_f64())
//! });
//! assert_eq!(b.value(), Some(1.0));
//!
//! // Mutate through the draft
//! let a = state.get("a").and_then(|a| a.as_draft()).unwrap();
//! a.set("b", 2).unwrap();
//! assert_eq!(b.value(), Some(2.0));
//!
//! // `c` was never written, so the snapshot shares it with `base`
//! let snap = snapshot(&Value::Draft(state), state);
//! assert_eq!(snap.to_json(), json!({ "a": { "b": 2 }, "c": [1] }));
//! ```

pub mod config;
pub mod draft;
pub mod error;
pub mod reactive;
pub mod snapshot;
pub mod value;

pub use config::{config, configure, EngineConfig, FlushMode};
pub use draft::{draft, is_modified, mark_raw, to_base, watch, Draft, Unwatch};
pub use error::{DraftError, DraftResult};
pub use reactive::{
    batch, current_scope, effect, effect_with, enable_tracking, flush, has_pending, is_tracking,
    on_scope_dispose, pause_tracking, reset_tracking, untracked, view, view_with, EffectOptions,
    EffectScope, ReactiveEffect, View, ViewOptions,
};
pub use snapshot::snapshot;
pub use value::{Container, Key, Node, NodeKind, Opaque, Value};
