//! Attribute value model.
//!
//! Instrumented attributes hold [`Value`]s. Most variants are plain immutable
//! data; the two interesting ones are:
//!
//! - [`Value::Ref`] - a relationship to another tracked instance, compared and
//!   diffed by instance identity
//! - [`Value::Blob`] - a *mutable scalar*: an opaque, interior-mutable payload
//!   shared through an `Rc`. Cloning a blob shares the payload (the engine's
//!   "shared by reference" commit semantics); [`Value::deep_copy`] produces an
//!   independent payload (the copy strategy behind value-based dirty
//!   detection).

use std::{cell::RefCell, fmt, rc::Rc};

use crate::model::InstanceId;

/// A single attribute value.
///
/// Equality compares by content: blobs compare their payload bytes, references
/// compare their instance handles, and values of different variants are never
/// equal. Use [`Value::same_identity`] when pointer/handle identity matters
/// (e.g. distinguishing two blobs with equal bytes).
#[derive(Debug, Clone)]
pub enum Value {
    /// The scalar null value; also the default for scalar attributes without
    /// an explicit registered default.
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer value
    Int(i64),
    /// Owned string value
    Str(String),
    /// Relationship to another tracked instance
    Ref(InstanceId),
    /// Mutable scalar payload, shared by reference on clone
    Blob(Rc<RefCell<Vec<u8>>>),
}

impl Value {
    /// Creates a blob value with a fresh payload cell.
    #[must_use]
    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Blob(Rc::new(RefCell::new(bytes.into())))
    }

    /// Returns true if this is [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the referenced instance handle for [`Value::Ref`] values.
    #[must_use]
    pub fn as_ref_id(&self) -> Option<InstanceId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns a copy of the blob payload for [`Value::Blob`] values.
    #[must_use]
    pub fn as_blob_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::Blob(cell) => Some(cell.borrow().clone()),
            _ => None,
        }
    }

    /// Deep copy: blobs get an independent payload cell, everything else is a
    /// plain clone. This is the default copy strategy for mutable-scalar
    /// attributes.
    #[must_use]
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Blob(cell) => Value::Blob(Rc::new(RefCell::new(cell.borrow().clone()))),
            other => other.clone(),
        }
    }

    /// Identity comparison: blobs by payload pointer, references by handle,
    /// everything else by value.
    #[must_use]
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Blob(a), Value::Blob(b)) => Rc::ptr_eq(a, b),
            (a, b) => a == b,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "'{v}'"),
            Value::Ref(id) => write!(f, "{id}"),
            Value::Blob(cell) => write!(f, "blob({} bytes)", cell.borrow().len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<InstanceId> for Value {
    fn from(value: InstanceId) -> Self {
        Value::Ref(value)
    }
}
