//! Object model for tracked instances.
//!
//! This module provides the non-intrusive handle types and the value model the
//! tracking engine operates on. Tracked objects are never required to inherit
//! from a common base or carry intrusive fields: they are addressed through
//! [`InstanceId`] handles, their runtime class through [`ClassId`] handles, and
//! all per-instance state lives in side tables owned by the
//! [`crate::tracking::AttributeManager`].
//!
//! # Key Components
//!
//! - [`ClassId`] / [`InstanceId`] - Dense, copyable handles for classes and instances
//! - [`ClassRegistry`] - Class hierarchy registry with precomputed ancestor chains
//! - [`Value`] - The attribute value model, including the mutable-scalar blob variant

mod class;
mod handle;
mod value;

pub use class::ClassRegistry;
pub use handle::{ClassId, InstanceId};
pub use value::Value;
