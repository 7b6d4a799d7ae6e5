use std::fmt;

/// A handle identifying a declared class within one manager.
///
/// Class handles are dense indices issued by
/// [`crate::tracking::AttributeManager::declare_class`]. They are only
/// meaningful within the manager that issued them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    /// Returns the raw index value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// A handle identifying a tracked instance within one manager.
///
/// Instance handles are the stable instance identity the engine keys its
/// per-instance state by. The tracked object itself is never touched; the
/// handle addresses a side-table entry owned by the manager. Handles are
/// issued by [`crate::tracking::AttributeManager::new_instance`] and become
/// stale after [`crate::tracking::AttributeManager::drop_instance`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub(crate) u32);

impl InstanceId {
    /// Returns the raw index value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}
