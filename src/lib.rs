// Copyright 2025 The attrscope authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # attrscope
//!
//! An in-process attribute instrumentation and change-tracking engine. `attrscope`
//! adds ORM-style "unit of work" behavior - dirty checking, collection change
//! history, bidirectional relationship consistency, and lazy population - to
//! plain object graphs without requiring those objects to share a common base
//! type or carry intrusive fields.
//!
//! ## Features
//!
//! - **Polymorphic attribute descriptors** - Register behavior per (class, key);
//!   subclasses inherit and may override individual keys
//! - **Snapshot-diff change history** - Added/unchanged/deleted partitions for
//!   any attribute, computed on demand against the committed baseline
//! - **Bidirectional relationship consistency** - A pluggable extension contract,
//!   with a built-in backref implementation that keeps mirrored attributes on two
//!   independently mutated objects consistent
//! - **Lazy population** - Caller-supplied loaders invoked exactly once on first
//!   access; the loaded value becomes the baseline, not a pending change
//! - **Unit-of-work commit/rollback** - Fix or discard a baseline for one or
//!   more instances in a single call
//! - **Deterministic snapshots** - Serialize a tracked object graph to canonical
//!   bytes and restore it, descriptors and loaders excluded by design
//!
//! ## Quick Start
//!
//! ```rust
//! use attrscope::prelude::*;
//!
//! let mut mgr = AttributeManager::new();
//! let user = mgr.declare_class("User", None)?;
//! mgr.register(user, "name", Cardinality::Scalar, AttributeOptions::new())?;
//!
//! let alice = mgr.new_instance(user)?;
//! mgr.set(alice, "name", Value::from("alice"))?;
//! mgr.commit(&[alice])?;
//!
//! mgr.set(alice, "name", Value::from("alicia"))?;
//! assert!(mgr.is_modified(alice)?);
//!
//! mgr.rollback(&[alice])?;
//! assert_eq!(mgr.get(alice, "name")?, Value::from("alice"));
//! # Ok::<(), attrscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `attrscope` is organized into several key modules:
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`model`] - Class hierarchy registry, handles, and the value model
//! - [`tracking`] - Descriptors, per-instance state, tracked collections,
//!   history computation, the extension contract, and the [`AttributeManager`]
//!   façade
//! - [`snapshot`] - Canonical byte-level serialization of tracked graphs
//! - [`Error`] and [`Result`] - Comprehensive error handling
//!
//! ### The Manager Façade
//!
//! The [`AttributeManager`] is the single entry point: it owns the class
//! registry, the descriptor registry, and all per-instance attribute state,
//! keyed by non-intrusive [`InstanceId`] handles. Callers register descriptors
//! on classes, create instances, and mutate attributes through the manager;
//! every structural mutation updates change history and fires registered
//! extensions before the mutating call returns.
//!
//! ### Threading Model
//!
//! The engine is single-threaded and synchronous by design: every operation
//! completes before returning, including lazy-load invocation and cascading
//! extension side effects. Re-entrant mutation triggered by extensions is
//! terminated by value/containment guards, not locks.

#[macro_use]
pub(crate) mod error;

pub mod model;
pub mod prelude;
pub mod snapshot;
pub mod tracking;

pub use error::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

pub use model::{ClassId, InstanceId, Value};
pub use tracking::{
    AttributeExtension, AttributeManager, AttributeOptions, BackrefExtension, Cardinality,
    ChangeOp, History, Loaded, Population, TrackedCollection,
};
