//! Effect Scopes
//!
//! A scope collects the effects, views and nested scopes created while it
//! is running, so they can be torn down together. Stopping a scope stops
//! everything registered in it and runs its disposal callbacks.
//!
//! A detached scope is not registered with the scope it was created in and
//! survives that scope being stopped.

use tracing::{debug, warn};

use super::effect::stop_effect;
use super::ids::{EffectId, ScopeId};
use super::runtime::Runtime;

/// Arena record for one scope.
#[derive(Default)]
pub(crate) struct ScopeRecord {
    pub(crate) parent: Option<ScopeId>,
    pub(crate) effects: Vec<EffectId>,
    pub(crate) scopes: Vec<ScopeId>,
    pub(crate) cleanups: Vec<Box<dyn FnOnce()>>,
}

/// Handle to an effect scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectScope {
    id: ScopeId,
}

impl EffectScope {
    /// Create a scope. Unless `detached`, it is registered with the scope
    /// that is currently running and stops with it.
    pub fn new(detached: bool) -> Self {
        let id = ScopeId::next();
        Runtime::with(|rt| {
            let parent = if detached {
                None
            } else {
                rt.context.active_scope
            };
            if let Some(parent) = parent.and_then(|parent| rt.scopes.get_mut(&parent)) {
                parent.scopes.push(id);
            }
            rt.scopes.insert(
                id,
                ScopeRecord {
                    parent,
                    ..ScopeRecord::default()
                },
            );
        });
        Self { id }
    }

    /// The scope's id.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Run `f` with this scope active, so that effects created inside are
    /// collected by it.
    ///
    /// Returns `None` without calling `f` if the scope was stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        struct Restore(Option<ScopeId>);
        impl Drop for Restore {
            fn drop(&mut self) {
                Runtime::try_with(|rt| rt.context.active_scope = self.0);
            }
        }

        let previous = Runtime::with(|rt| {
            if !rt.scopes.contains_key(&self.id) {
                if rt.config.dev_warnings {
                    warn!(scope = self.id.raw(), "cannot run an inactive effect scope");
                }
                return None;
            }
            Some(rt.context.active_scope.replace(self.id))
        })?;

        let _restore = Restore(previous);
        Some(f())
    }

    /// Stop every effect and nested scope collected by this scope, then run
    /// its disposal callbacks. Stopping twice does nothing.
    pub fn stop(&self) {
        let Some(record) = Runtime::with(|rt| {
            let record = rt.scopes.remove(&self.id)?;
            if let Some(parent) = record.parent.and_then(|parent| rt.scopes.get_mut(&parent)) {
                parent.scopes.retain(|scope| *scope != self.id);
            }
            Some(record)
        }) else {
            return;
        };

        debug!(
            scope = self.id.raw(),
            effects = record.effects.len(),
            scopes = record.scopes.len(),
            "effect scope stopped"
        );

        for effect in record.effects {
            stop_effect(effect);
        }
        for scope in record.scopes {
            EffectScope { id: scope }.stop();
        }
        for cleanup in record.cleanups {
            cleanup();
        }
    }

    /// Whether the scope has not been stopped.
    pub fn is_active(&self) -> bool {
        Runtime::with(|rt| rt.scopes.contains_key(&self.id))
    }
}

/// The scope that is currently running, if any.
pub fn current_scope() -> Option<EffectScope> {
    Runtime::with(|rt| rt.context.active_scope).map(|id| EffectScope { id })
}

/// Register `f` to run when the current scope stops.
///
/// Outside a running scope `f` is dropped without being called.
pub fn on_scope_dispose(f: impl FnOnce() + 'static) {
    let rejected = Runtime::with(|rt| {
        let scope = rt
            .context
            .active_scope
            .and_then(|scope| rt.scopes.get_mut(&scope));
        match scope {
            Some(scope) => {
                scope.cleanups.push(Box::new(f));
                None
            }
            None => {
                if rt.config.dev_warnings {
                    warn!("on_scope_dispose called without an active effect scope");
                }
                Some(f)
            }
        }
    });
    drop(rejected);
}

impl Runtime {
    /// Register an effect with the running scope, if any.
    pub(crate) fn record_in_scope(&mut self, effect: EffectId) {
        if let Some(scope) = self
            .context
            .active_scope
            .and_then(|scope| self.scopes.get_mut(&scope))
        {
            scope.effects.push(effect);
        }
    }
}
