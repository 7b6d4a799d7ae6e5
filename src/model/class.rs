//! Class hierarchy registry.
//!
//! Descriptor resolution is polymorphic over the *runtime* class of an
//! instance: the effective descriptor for `(class, key)` is found by walking
//! the class's ancestor chain from most-derived to least-derived and taking
//! the first registration. The registry precomputes that chain at declaration
//! time, so resolution is a linear scan over a small slice with no recursion.

use std::collections::HashMap;

use crate::{model::ClassId, Error, Result};

/// One declared class: its name, optional parent, and precomputed ancestors.
#[derive(Debug, Clone)]
struct ClassEntry {
    name: String,
    parent: Option<ClassId>,
    /// Ancestor chain, self first, most-derived to least-derived.
    ancestors: Vec<ClassId>,
}

/// Registry of declared classes and their inheritance relationships.
///
/// Owned by the [`crate::tracking::AttributeManager`]; classes are declared
/// once and live for the lifetime of the manager. Names must be unique since
/// the snapshot codec resolves classes by name when restoring a graph.
///
/// # Examples
///
/// ```rust
/// use attrscope::AttributeManager;
///
/// let mut mgr = AttributeManager::new();
/// let base = mgr.declare_class("Element", None)?;
/// let sub = mgr.declare_class("SubElement", Some(base))?;
/// # Ok::<(), attrscope::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: Vec<ClassEntry>,
    by_name: HashMap<String, ClassId>,
}

impl ClassRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a new class with an optional parent.
    ///
    /// The ancestor chain is computed eagerly: `[self] ++ ancestors(parent)`.
    ///
    /// # Arguments
    /// * `name` - Unique class name; used by the snapshot codec for restore
    /// * `parent` - Handle of the superclass, if any
    ///
    /// # Errors
    /// [`Error::Configuration`] if the name is empty or already declared,
    /// [`Error::InvalidHandle`] if `parent` is not a handle from this registry
    /// or the class table is exhausted.
    pub fn declare(&mut self, name: &str, parent: Option<ClassId>) -> Result<ClassId> {
        if name.is_empty() {
            return Err(Error::Configuration(
                "class names must be non-empty".to_string(),
            ));
        }
        if self.by_name.contains_key(name) {
            return Err(Error::Configuration(format!(
                "class '{name}' is already declared"
            )));
        }

        let id = ClassId(
            u32::try_from(self.classes.len())
                .map_err(|_| Error::InvalidHandle("class table exhausted".to_string()))?,
        );
        let mut ancestors = vec![id];
        if let Some(parent) = parent {
            ancestors.extend_from_slice(self.ancestors(parent)?);
        }

        self.classes.push(ClassEntry {
            name: name.to_string(),
            parent,
            ancestors,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Returns the ancestor chain of `class`, self first, most-derived to
    /// least-derived.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] if `class` is not a handle from this registry.
    pub fn ancestors(&self, class: ClassId) -> Result<&[ClassId]> {
        Ok(&self.entry(class)?.ancestors)
    }

    /// Returns the name of `class`.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] if `class` is not a handle from this registry.
    pub fn name(&self, class: ClassId) -> Result<&str> {
        Ok(&self.entry(class)?.name)
    }

    /// Returns the parent of `class`, if it has one.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] if `class` is not a handle from this registry.
    pub fn parent(&self, class: ClassId) -> Result<Option<ClassId>> {
        Ok(self.entry(class)?.parent)
    }

    /// Looks a class up by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Returns true if `class` equals `ancestor` or inherits from it.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] if `class` is not a handle from this registry.
    pub fn is_subclass_of(&self, class: ClassId, ancestor: ClassId) -> Result<bool> {
        Ok(self.ancestors(class)?.contains(&ancestor))
    }

    /// Number of declared classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if no classes are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    fn entry(&self, class: ClassId) -> Result<&ClassEntry> {
        self.classes
            .get(class.index())
            .ok_or_else(|| Error::InvalidHandle(format!("{class} is not declared here")))
    }
}
