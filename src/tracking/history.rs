//! Snapshot-diff change history.
//!
//! A [`History`] is the derived difference between an attribute's live value
//! and its committed baseline. It is computed on demand by
//! [`crate::tracking::AttributeManager::history`] and never cached, since both
//! sides can change between calls.

use crate::model::Value;

/// The added/unchanged/deleted partition for one (instance, attribute) pair.
///
/// - `added`: items present in the live value but not in the baseline, in live
///   order
/// - `unchanged`: items present in both, in live order
/// - `deleted`: items present in the baseline but not in the live value, in
///   baseline order
///
/// For scalar attributes each set degenerates to at most one item. The three
/// sets are disjoint by construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    /// Items in the live value that are not in the committed baseline
    pub added: Vec<Value>,
    /// Items present in both the live value and the committed baseline
    pub unchanged: Vec<Value>,
    /// Items in the committed baseline that are no longer in the live value
    pub deleted: Vec<Value>,
}

impl History {
    /// Returns true if nothing was added or deleted.
    ///
    /// An empty history is exactly the "not modified" condition for
    /// relationship-typed attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }

    /// Computes the history of a scalar attribute.
    ///
    /// `committed` of `None` means the baseline is unset (never committed):
    /// any non-null current value counts as added.
    pub(crate) fn of_scalar(current: &Value, committed: Option<&Value>) -> History {
        let mut history = History::default();
        match committed {
            Some(committed) if committed == current => {
                if !current.is_null() {
                    history.unchanged.push(current.clone());
                }
            }
            Some(committed) => {
                if !current.is_null() {
                    history.added.push(current.clone());
                }
                if !committed.is_null() {
                    history.deleted.push(committed.clone());
                }
            }
            None => {
                if !current.is_null() {
                    history.added.push(current.clone());
                }
            }
        }
        history
    }

    /// Computes the history of a collection attribute.
    ///
    /// Multiset-aware: duplicate members are matched one-to-one, so a member
    /// appearing twice in the live value but once in the baseline contributes
    /// one `unchanged` and one `added` entry.
    pub(crate) fn of_collection(current: &[Value], committed: Option<&[Value]>) -> History {
        let committed = committed.unwrap_or(&[]);
        let mut matched = vec![false; committed.len()];
        let mut history = History::default();

        for item in current {
            let slot = committed
                .iter()
                .enumerate()
                .find(|(i, candidate)| !matched[*i] && *candidate == item)
                .map(|(i, _)| i);
            match slot {
                Some(i) => {
                    matched[i] = true;
                    history.unchanged.push(item.clone());
                }
                None => history.added.push(item.clone()),
            }
        }
        for (i, item) in committed.iter().enumerate() {
            if !matched[i] {
                history.deleted.push(item.clone());
            }
        }
        history
    }
}
