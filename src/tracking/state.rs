//! Per-instance attribute state.
//!
//! One [`AttributeState`] exists for each (instance, key) pair that has been
//! touched. It is created lazily on first access and destroyed with the
//! instance; the manager holds it in a side table keyed by instance handle,
//! so tracked objects stay free of intrusive fields.

use crate::{
    model::Value,
    tracking::{ScalarCopy, TrackedCollection},
};

/// Population state of one attribute on one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Population {
    /// Never assigned or loaded; the live value is the pre-registration
    /// default (scalar default or empty collection).
    Uninitialized,
    /// A lazy loader is registered and has not yet been consumed. The first
    /// read invokes it exactly once and its result becomes the baseline.
    PendingLazyLoad,
    /// The attribute holds a real value (assigned, loaded, or committed).
    Populated,
}

/// The live or committed payload of one attribute.
///
/// A collection attribute's slot is always a [`TrackedCollection`] once
/// touched, never a raw sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Scalar payload
    Scalar(Value),
    /// Collection payload
    Collection(TrackedCollection),
}

impl Slot {
    /// Snapshot for commit: scalars go through the mutable-scalar copy
    /// strategy when one is configured, otherwise values are shared by
    /// reference (a blob clone shares its payload cell, a ref is a plain
    /// handle copy). Collection snapshots clone membership only.
    pub(crate) fn commit_snapshot(&self, copy: Option<&ScalarCopy>) -> Slot {
        match self {
            Slot::Scalar(value) => match copy {
                Some(copy) => Slot::Scalar(copy(value)),
                None => Slot::Scalar(value.clone()),
            },
            Slot::Collection(collection) => Slot::Collection(collection.clone()),
        }
    }

    /// The member values of a collection slot, or the scalar as a one-element
    /// (or empty, when null) slice-like vector.
    pub(crate) fn members(&self) -> Vec<Value> {
        match self {
            Slot::Scalar(value) if value.is_null() => Vec::new(),
            Slot::Scalar(value) => vec![value.clone()],
            Slot::Collection(collection) => collection.to_vec(),
        }
    }
}

/// Tracking state for one (instance, key) pair.
#[derive(Debug, Clone)]
pub struct AttributeState {
    /// The live value
    pub current: Slot,
    /// Last committed baseline; `None` is the *unset* sentinel (never
    /// committed since registration or the last rollback-to-default)
    pub committed: Option<Slot>,
    /// Population state
    pub population: Population,
}

impl AttributeState {
    /// Returns true if this state counts as touched (participates in
    /// commit/rollback and history).
    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.population != Population::Uninitialized
    }
}
