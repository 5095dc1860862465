//! Identifiers for arena records.
//!
//! Every record the runtime owns (draft states, deps, effects, scopes and
//! watch listeners) is addressed by a small copyable id. Ids come from
//! per-type counters, so an id is never reused and a stale id simply misses
//! its arena slot.

use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Generate a new unique id.
            pub(crate) fn next() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(1);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }

            /// Get the raw id value.
            pub fn raw(&self) -> u64 {
                self.0
            }
        }
    };
}

counter_id!(
    /// Identifies one draft state in the runtime arena.
    DraftId
);

counter_id!(
    /// Identifies one dependency (subscriber set).
    DepId
);

counter_id!(
    /// Identifies one reactive effect.
    EffectId
);

counter_id!(
    /// Identifies one effect scope.
    ScopeId
);

counter_id!(
    /// Identifies one `watch` registration.
    ListenerId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let id1 = EffectId::next();
        let id2 = EffectId::next();
        let id3 = EffectId::next();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ids_are_never_zero() {
        assert_ne!(DraftId::next().raw(), 0);
        assert_ne!(DepId::next().raw(), 0);
    }
}
