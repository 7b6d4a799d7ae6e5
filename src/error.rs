use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers every failure mode of the change-tracking engine: descriptor
/// registration, attribute access, structural collection mutation, and snapshot
/// encoding/decoding. Each variant provides specific context about the failure
/// mode to enable appropriate error handling.
///
/// # Error Categories
///
/// ## Registration Errors
/// - [`Error::Configuration`] - Contradictory or invalid registration options
///
/// ## Access Errors
/// - [`Error::UnknownAttribute`] - Key never registered for the resolved class chain
/// - [`Error::UnsupportedOperation`] - Operation invalid for the attribute's cardinality
/// - [`Error::NotFound`] - Removing an absent collection member
/// - [`Error::InvalidHandle`] - Stale or foreign instance/class handle
///
/// ## Snapshot Errors
/// - [`Error::Malformed`] - Corrupted or internally inconsistent snapshot data
/// - [`Error::Serialization`] - JSON encoding/decoding errors from the codec
///
/// All errors are local, synchronous, and non-recoverable by the engine itself:
/// no operation is retried internally, and a failing operation never leaves an
/// instance's attribute state partially mutated.
///
/// # Examples
///
/// ```rust
/// use attrscope::{AttributeManager, Error};
///
/// let mut mgr = AttributeManager::new();
/// let class = mgr.declare_class("Widget", None)?;
/// let widget = mgr.new_instance(class)?;
///
/// match mgr.get(widget, "missing") {
///     Err(Error::UnknownAttribute { class, key }) => {
///         eprintln!("no attribute '{key}' on '{class}'");
///     }
///     other => panic!("expected UnknownAttribute, got {other:?}"),
/// }
/// # Ok::<(), attrscope::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Contradictory or otherwise invalid registration options.
    ///
    /// Raised at registration time for options that can be checked eagerly
    /// (a `mutable_scalar_copy` or `default` on a collection attribute, a
    /// duplicate class name), and at first use for options that are checked
    /// lazily (a loader whose result arity contradicts the registered
    /// cardinality).
    #[error("Configuration - {0}")]
    Configuration(String),

    /// No descriptor is registered for the requested key anywhere in the
    /// instance's class ancestor chain.
    ///
    /// Descriptor resolution walks the runtime class's ancestors from
    /// most-derived to least-derived; this error means the walk exhausted
    /// the chain without a match.
    #[error("No attribute '{key}' registered for class '{class}' or its ancestors")]
    UnknownAttribute {
        /// Name of the instance's runtime class
        class: String,
        /// The attribute key that failed to resolve
        key: String,
    },

    /// The requested operation is invalid for the attribute's cardinality.
    ///
    /// Scalar operations (`get`/`set`) on collection attributes and
    /// structural operations (`append`/`remove`/`assign`) on scalar
    /// attributes both land here.
    #[error("Unsupported operation - {0}")]
    UnsupportedOperation(String),

    /// A collection member targeted for removal is not present.
    ///
    /// Raised before any extension side effect has fired, so the collection
    /// and all mirrored attributes are untouched.
    #[error("Not found - {0}")]
    NotFound(String),

    /// An instance or class handle does not refer to a live entry in this
    /// manager.
    ///
    /// Handles are only meaningful within the manager that issued them;
    /// this error covers dropped instances and handles from a different
    /// manager.
    #[error("Invalid handle - {0}")]
    InvalidHandle(String),

    /// Snapshot data is damaged or internally inconsistent.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// JSON encoding or decoding failure in the snapshot codec.
    #[error("{0}")]
    Serialization(#[from] serde_json::Error),
}
