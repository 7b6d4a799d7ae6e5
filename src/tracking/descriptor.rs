//! Per-class, per-key attribute descriptors.
//!
//! A descriptor defines how one attribute behaves for one defining class:
//! its cardinality, whether members carry parent markers, which relationship
//! extensions fire on mutation, an optional lazy-population loader, an
//! optional mutable-scalar copy strategy, and an optional scalar default.
//!
//! Descriptors are registered against exactly one defining class and are
//! inherited by subclasses through the resolution walk in
//! [`crate::tracking::AttributeManager`]; a subclass re-registration of the
//! same key overrides the inherited behavior for that key only.
//!
//! # Usage Examples
//!
//! ```rust
//! use attrscope::prelude::*;
//!
//! let mut mgr = AttributeManager::new();
//! let node = mgr.declare_class("Node", None)?;
//! mgr.register(
//!     node,
//!     "children",
//!     Cardinality::Collection,
//!     AttributeOptions::new().track_parent(true),
//! )?;
//! # Ok::<(), attrscope::Error>(())
//! ```

use std::{fmt, rc::Rc};

use strum::Display;

use crate::model::{ClassId, InstanceId, Value};

/// Whether an attribute holds a single value or an ordered collection.
///
/// Fixed at registration and never changes for a given descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Cardinality {
    /// One value per instance
    Scalar,
    /// An ordered collection of values per instance
    Collection,
}

/// Result of a lazy-population loader.
///
/// The arity must match the descriptor's [`Cardinality`]; the mismatch is
/// detected at first load, not at registration, mirroring permissive
/// registration semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// A single value for a scalar attribute
    Scalar(Value),
    /// An ordered sequence for a collection attribute
    Sequence(Vec<Value>),
}

/// Caller-supplied lazy-population source.
///
/// Invoked exactly once, synchronously, on the first read of a pending
/// attribute; the engine treats it as an opaque call and installs the result
/// as both the live value and the committed baseline. Loaders are never
/// serialized; a deserialized graph needs re-registration to regain them.
pub type Loader = Rc<dyn Fn(InstanceId) -> Loaded>;

/// Copy strategy for mutable-scalar attributes.
///
/// When present, `commit` snapshots the value through this function instead of
/// sharing it by reference, and dirty detection compares current to committed
/// by value. [`Value::deep_copy`] is the usual choice.
pub type ScalarCopy = Rc<dyn Fn(&Value) -> Value>;

/// Registration options for one attribute.
///
/// Builder-style; every option defaults to off. Contradictory combinations
/// (`mutable_scalar_copy` or `default` on a collection attribute) are rejected
/// at registration; loader arity is checked lazily at first load.
#[derive(Clone, Default)]
pub struct AttributeOptions {
    pub(crate) track_parent: bool,
    pub(crate) extensions: Vec<Rc<dyn crate::tracking::AttributeExtension>>,
    pub(crate) loader: Option<Loader>,
    pub(crate) mutable_scalar_copy: Option<ScalarCopy>,
    pub(crate) default: Option<Value>,
}

impl AttributeOptions {
    /// Creates options with everything off.
    #[must_use]
    pub fn new() -> Self {
        Self {
            track_parent: false,
            extensions: Vec::new(),
            loader: None,
            mutable_scalar_copy: None,
            default: None,
        }
    }

    /// Enables parent markers: appending a member to this collection records
    /// the owner on the member for [`crate::tracking::AttributeManager::has_parent`]
    /// queries, and removing it clears the marker.
    #[must_use]
    pub fn track_parent(mut self, enabled: bool) -> Self {
        self.track_parent = enabled;
        self
    }

    /// Attaches a relationship extension. Extensions fire in registration
    /// order on every structural mutation.
    #[must_use]
    pub fn extension(mut self, extension: Rc<dyn crate::tracking::AttributeExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Supplies a lazy-population loader.
    #[must_use]
    pub fn loader(mut self, loader: Loader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Supplies a mutable-scalar copy strategy, making this a value-compared
    /// mutable scalar rather than a relationship attribute.
    #[must_use]
    pub fn mutable_scalar_copy(mut self, copy: ScalarCopy) -> Self {
        self.mutable_scalar_copy = Some(copy);
        self
    }

    /// Supplies the scalar default reported before any assignment and used as
    /// the rollback target while the baseline is unset.
    #[must_use]
    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

impl fmt::Debug for AttributeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeOptions")
            .field("track_parent", &self.track_parent)
            .field("extensions", &self.extensions.len())
            .field("loader", &self.loader.is_some())
            .field("mutable_scalar_copy", &self.mutable_scalar_copy.is_some())
            .field("default", &self.default)
            .finish()
    }
}

/// The effective behavior definition for one (defining class, key) pair.
///
/// Created at registration and shared by handle; lookups from subclasses
/// resolve to the nearest registration in the ancestor chain.
pub struct AttributeDescriptor {
    /// The class this descriptor was registered against
    pub defining_class: ClassId,
    /// The attribute key
    pub key: String,
    /// Scalar or collection, fixed for the descriptor's lifetime
    pub cardinality: Cardinality,
    pub(crate) options: AttributeOptions,
}

impl AttributeDescriptor {
    /// Returns true if members of this attribute carry parent markers.
    #[must_use]
    pub fn tracks_parent(&self) -> bool {
        self.options.track_parent
    }

    /// Returns true if this attribute has a lazy-population loader.
    #[must_use]
    pub fn has_loader(&self) -> bool {
        self.options.loader.is_some()
    }

    /// Returns true if this is a value-compared mutable scalar.
    #[must_use]
    pub fn is_mutable_scalar(&self) -> bool {
        self.options.mutable_scalar_copy.is_some()
    }

    /// The registered scalar default, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.options.default.as_ref()
    }
}

impl fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("defining_class", &self.defining_class)
            .field("key", &self.key)
            .field("cardinality", &self.cardinality)
            .field("options", &self.options)
            .finish()
    }
}
