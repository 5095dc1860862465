//! Notification Scheduler
//!
//! `watch` listeners are never called from inside a mutation. A mutation
//! queues the draft it touched and every ancestor of that draft; listeners
//! run when the queue is flushed. Many mutations between two flushes
//! coalesce into one call per listener.
//!
//! When the queue is flushed depends on [`FlushMode`]:
//!
//! - `Manual`: on [`flush`], or when the outermost [`batch`] returns.
//! - `Sync`: additionally at the end of every mutation made outside a batch.

use std::rc::Rc;

use indexmap::IndexSet;
use tracing::debug;

use super::ids::DraftId;
use super::runtime::{run_pending_effects, Runtime};
use crate::config::FlushMode;

/// Drafts with undelivered notifications.
#[derive(Debug, Default)]
pub(crate) struct NotifyQueue {
    pub(crate) pending: IndexSet<DraftId>,
    pub(crate) batch_depth: u32,
    pub(crate) flushing: bool,
}

/// Deliver every queued notification.
///
/// Listeners that mutate drafts queue new notifications, which are
/// delivered before `flush` returns. Calling `flush` from a listener does
/// nothing.
pub fn flush() {
    struct Flushing;
    impl Drop for Flushing {
        fn drop(&mut self) {
            Runtime::try_with(|rt| rt.queue.flushing = false);
        }
    }

    let started = Runtime::with(|rt| !std::mem::replace(&mut rt.queue.flushing, true));
    if !started {
        return;
    }
    let _flushing = Flushing;

    loop {
        let listeners: Vec<Rc<dyn Fn()>> = Runtime::with(|rt| {
            let pending = std::mem::take(&mut rt.queue.pending);
            pending
                .iter()
                .filter_map(|draft| rt.states.get(draft))
                .flat_map(|state| state.listeners.values().cloned())
                .collect()
        });
        if listeners.is_empty() && !has_pending() {
            break;
        }

        debug!(listeners = listeners.len(), "flush");
        for listener in listeners {
            listener();
        }
    }
}

/// Run `f`, then flush once the outermost batch returns.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    struct Depth;
    impl Drop for Depth {
        fn drop(&mut self) {
            Runtime::try_with(|rt| rt.queue.batch_depth = rt.queue.batch_depth.saturating_sub(1));
        }
    }

    Runtime::with(|rt| rt.queue.batch_depth += 1);
    let result = {
        let _depth = Depth;
        f()
    };

    if Runtime::with(|rt| rt.queue.batch_depth == 0) {
        flush();
    }
    result
}

/// Whether notifications are waiting for a flush.
pub fn has_pending() -> bool {
    Runtime::with(|rt| !rt.queue.pending.is_empty())
}

/// Finish a mutation: run triggered effects, then flush if the
/// configuration asks for synchronous delivery.
pub(crate) fn after_mutation() {
    run_pending_effects();

    let sync = Runtime::with(|rt| {
        rt.config.flush_mode == FlushMode::Sync && rt.queue.batch_depth == 0 && !rt.queue.flushing
    });
    if sync {
        flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_on_empty_queue_is_noop() {
        assert!(!has_pending());
        flush();
        assert!(!Runtime::with(|rt| rt.queue.flushing));
    }

    #[test]
    fn batch_restores_depth() {
        let value = batch(|| batch(|| Runtime::with(|rt| rt.queue.batch_depth)));
        assert_eq!(value, 2);
        assert_eq!(Runtime::with(|rt| rt.queue.batch_depth), 0);
    }

    #[test]
    fn pending_drafts_without_state_are_dropped() {
        Runtime::with(|rt| {
            rt.queue.pending.insert(DraftId::next());
        });
        assert!(has_pending());
        flush();
        assert!(!has_pending());
    }
}
