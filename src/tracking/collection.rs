//! Ordered collection wrapper for collection-valued attributes.
//!
//! Once a collection attribute is touched, its live value is always a
//! [`TrackedCollection`], never a raw sequence. The collection guarantees
//! insertion order and exposes the read surface; structural mutation
//! (`append`/`remove`/`assign`) is routed through the
//! [`crate::tracking::AttributeManager`] so that parent markers and
//! relationship extensions fire with every change.

use crate::model::Value;

/// An ordered, mutable sequence of attribute values.
///
/// Membership is content-based ([`Value`] equality): references compare by
/// instance handle, blobs by payload bytes. Appends of already-present members
/// are no-ops at the manager level, which both keeps history duplicate-free
/// and terminates backref propagation cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedCollection {
    items: Vec<Value>,
}

impl TrackedCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collection from existing members, preserving order.
    #[must_use]
    pub fn from_items(items: Vec<Value>) -> Self {
        Self { items }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the collection has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if `item` is a member.
    #[must_use]
    pub fn contains(&self, item: &Value) -> bool {
        self.items.contains(item)
    }

    /// Position of `item`, if present.
    #[must_use]
    pub fn position(&self, item: &Value) -> Option<usize> {
        self.items.iter().position(|member| member == item)
    }

    /// Member at `index`, if in bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Iterates members in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// The members as a slice, in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    /// Clones the members out into a plain vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.items.clone()
    }

    pub(crate) fn push(&mut self, item: Value) {
        self.items.push(item);
    }

    /// Removes and returns the member at `index`, shifting later members left.
    pub(crate) fn remove_at(&mut self, index: usize) -> Value {
        self.items.remove(index)
    }
}

impl<'a> IntoIterator for &'a TrackedCollection {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
