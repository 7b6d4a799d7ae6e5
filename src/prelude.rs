//! # attrscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits from the attrscope library. Import this module to get quick
//! access to the essential types for attribute instrumentation and change
//! tracking.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all attrscope operations
pub use crate::Error;

/// The result type used throughout attrscope
pub use crate::Result;

// ================================================================================================
// Main Entry Point
// ================================================================================================

/// The registry and façade for all tracking operations
pub use crate::tracking::AttributeManager;

// ================================================================================================
// Object Model
// ================================================================================================

/// Non-intrusive handles for classes and tracked instances
pub use crate::model::{ClassId, InstanceId};

/// The value model for instrumented attributes
pub use crate::model::Value;

// ================================================================================================
// Tracking Types
// ================================================================================================

/// Descriptor configuration
pub use crate::tracking::{AttributeOptions, Cardinality, Loaded};

/// Change history and population state
pub use crate::tracking::{History, Population};

/// Ordered collection wrapper for collection-valued attributes
pub use crate::tracking::TrackedCollection;

/// Relationship extension contract and the built-in backref implementation
pub use crate::tracking::{AttributeExtension, BackrefExtension, ChangeOp};
