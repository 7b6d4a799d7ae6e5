//! Attribute instrumentation and change tracking.
//!
//! This module is the core of the engine. It provides the per-class attribute
//! descriptors, the per-instance attribute state, the ordered tracked
//! collection used for collection-valued attributes, on-demand change history,
//! the relationship extension contract, and the [`AttributeManager`] façade
//! that ties all of it together.
//!
//! # Key Components
//!
//! - [`AttributeManager`] - Registry and façade; resolves descriptors for an
//!   instance's runtime class and holds all per-instance state
//! - [`AttributeDescriptor`] / [`AttributeOptions`] - Per-(class, key)
//!   behavior definition: cardinality, extensions, lazy loader,
//!   parent-tracking, mutable-scalar copy strategy
//! - [`TrackedCollection`] - Ordered sequence wrapper for one-to-many
//!   attributes
//! - [`History`] - Added/unchanged/deleted snapshot diff for one
//!   (instance, attribute) pair
//! - [`AttributeExtension`] / [`BackrefExtension`] - Mutation hook contract
//!   and the built-in bidirectional-consistency implementation
//!
//! # Control Flow
//!
//! Callers register descriptors on classes through the manager. Instances are
//! then mutated through the manager's `get`/`set`/`append`/`remove`/`assign`
//! operations; every structural change updates per-instance history state and
//! fires extensions before the mutating call returns. Callers periodically
//! `commit` or `rollback` instances to fix or discard a baseline.
//!
//! # Thread Safety
//!
//! The whole module is single-threaded by design: types are neither [`Send`]
//! nor [`Sync`] (descriptors hold `Rc` extension and loader handles). There is
//! no locking; re-entrant mutation through extensions is terminated by
//! value/containment guards.

mod collection;
mod descriptor;
mod extension;
mod history;
mod manager;
mod state;

pub use collection::TrackedCollection;
pub use descriptor::{AttributeDescriptor, AttributeOptions, Cardinality, Loaded, Loader, ScalarCopy};
pub use extension::{AttributeExtension, BackrefExtension, ChangeOp};
pub use history::History;
pub use manager::AttributeManager;
pub use state::{AttributeState, Population, Slot};
