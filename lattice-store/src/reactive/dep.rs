//! Dependencies
//!
//! A [`Dep`] is the subscriber set for one trackable slot: a property of a
//! draft, its iteration order, or a view's identity.
//!
//! # Bit markers
//!
//! Re-running an effect must drop the deps it no longer reads and keep the
//! ones it still reads, without rescanning every dep. Each nesting depth of
//! running effects owns one bit. Before the run, the effect sets its bit in
//! `w` ("was tracked") of every dep it currently holds; during the run,
//! each read sets the bit in `n` ("newly tracked"). Afterwards, deps with
//! the bit in `w` but not in `n` are stale and get unlinked. Both bits are
//! cleared again so the next run starts fresh.

use indexmap::IndexSet;

use super::ids::EffectId;
use crate::value::{Key, Value};

/// The slot a dep tracks within one draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// An object property or array index.
    Key(Key),
    /// The array length.
    Length,
    /// A map entry or set member, keyed by its base value.
    Entry(Value),
    /// Size and iteration order (object keys, map/set contents).
    Iterate,
    /// Map key iteration, separate from value iteration.
    MapKeyIterate,
    /// Any change anywhere in the draft's subtree.
    Draft,
}

/// Kind of read being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    /// Value read.
    Get,
    /// Membership test.
    Has,
    /// Enumeration or size.
    Iterate,
}

/// Kind of change being triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// Existing slot overwritten.
    Set,
    /// New slot created.
    Add,
    /// Slot removed.
    Delete,
    /// Collection emptied.
    Clear,
    /// Something in a draft's subtree changed; the draft reference did not.
    Draft,
}

impl TriggerOp {
    /// Whether this op reports a confirmed change to a tracked slot.
    #[inline]
    pub fn is_value_change(&self) -> bool {
        !matches!(self, TriggerOp::Draft)
    }
}

/// Subscriber set plus generation markers.
#[derive(Debug, Default)]
pub(crate) struct Dep {
    pub(crate) effects: IndexSet<EffectId>,
    /// Bits of effect depths that held this dep before their current run.
    pub(crate) w: u32,
    /// Bits of effect depths that read this dep during their current run.
    pub(crate) n: u32,
}

impl Dep {
    #[inline]
    pub(crate) fn was_tracked(&self, bit: u32) -> bool {
        self.w & bit != 0
    }

    #[inline]
    pub(crate) fn new_tracked(&self, bit: u32) -> bool {
        self.n & bit != 0
    }
}
