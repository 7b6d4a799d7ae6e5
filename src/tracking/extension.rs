//! Relationship extension contract and backref consistency.
//!
//! Extensions are stateless strategy objects attached to a descriptor at
//! registration. The manager invokes them after a structural mutation has been
//! applied and before the mutating call returns, in registration order. An
//! extension receives the manager itself and may mutate other instances -
//! that is how the built-in [`BackrefExtension`] keeps two mirrored attributes
//! on two independently mutated objects consistent.
//!
//! # Re-entrancy
//!
//! Cascades terminate without locks: every propagation step checks the target
//! first ("skip if it already holds the desired value/membership"), which is
//! the same guard that makes repeated identical `set`/`append` calls
//! idempotent. A detach additionally skips when the far side has already been
//! independently updated to a different value.
//!
//! # The mirrored scalar pair state machine
//!
//! For a mirrored scalar pair `A.x ↔ B.y`:
//!
//! - `a.x = b` while unattached: sets `b.y = a`
//! - `a.x = b2` while attached to `b`: clears `b.y`, sets `b2.y = a`
//! - `a.x = null`: clears the previous partner's `y`

use strum::{Display, EnumIter};

use crate::{
    model::{InstanceId, Value},
    tracking::{AttributeManager, Cardinality},
    Result,
};

/// The structural operation that triggered an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum ChangeOp {
    /// A member was appended to a collection
    Add,
    /// A member was removed from a collection
    Remove,
    /// A scalar value was replaced
    Replace,
}

/// Hook invoked on every structural mutation of an instrumented attribute.
///
/// Hooks run in two phases: [`Self::check`] is consulted for every extension
/// *before* the structural change is applied, and [`Self::on_change`] fires
/// after it. A refusing `check` aborts the operation with the attribute state
/// untouched, which is what keeps failing mutations atomic.
///
/// Implementations must be synchronous and are expected to guard their own
/// re-entrancy by checking target state before mutating, as
/// [`BackrefExtension`] does.
pub trait AttributeExtension {
    /// Pre-flight validation, invoked before the structural mutation is
    /// applied.
    ///
    /// Surface configuration problems here (unresolvable targets, missing
    /// registrations) rather than from [`Self::on_change`], which runs with
    /// the mutation already in place. The default implementation accepts
    /// everything.
    ///
    /// # Errors
    /// Errors abort the triggering mutation before any state change.
    fn check(
        &self,
        mgr: &AttributeManager,
        owner: InstanceId,
        key: &str,
        item: &Value,
        previous: Option<&Value>,
        op: ChangeOp,
    ) -> Result<()> {
        let _ = (mgr, owner, key, item, previous, op);
        Ok(())
    }

    /// Called after `owner.key` was mutated.
    ///
    /// # Arguments
    /// * `mgr` - The manager, for cascading mutations
    /// * `owner` - The instance whose attribute changed
    /// * `key` - The mutated attribute key
    /// * `item` - The added/removed member, or the new scalar value
    /// * `previous` - The replaced scalar value for [`ChangeOp::Replace`]
    /// * `op` - Which structural operation occurred
    ///
    /// # Errors
    /// Errors propagate unchanged to the caller of the triggering mutation.
    fn on_change(
        &self,
        mgr: &mut AttributeManager,
        owner: InstanceId,
        key: &str,
        item: &Value,
        previous: Option<&Value>,
        op: ChangeOp,
    ) -> Result<()>;
}

/// Keeps a mirrored attribute on the related instance consistent.
///
/// Configured with the key name of the mirrored attribute on the related
/// instance's class. On `Add` the related side gains a reference to the
/// owner; on `Remove` it loses it; on `Replace` the previous partner is
/// detached before the new one is attached. Both scalar and collection
/// mirrors are supported; the mirror's cardinality is resolved through the
/// related instance's own class chain, so the same extension instance serves
/// polymorphic hierarchies.
///
/// # Usage Examples
///
/// ```rust
/// use std::rc::Rc;
/// use attrscope::prelude::*;
///
/// let mut mgr = AttributeManager::new();
/// let user = mgr.declare_class("User", None)?;
/// let address = mgr.declare_class("Address", None)?;
///
/// mgr.register(
///     user,
///     "addresses",
///     Cardinality::Collection,
///     AttributeOptions::new().extension(Rc::new(BackrefExtension::new("user"))),
/// )?;
/// mgr.register(
///     address,
///     "user",
///     Cardinality::Scalar,
///     AttributeOptions::new().extension(Rc::new(BackrefExtension::new("addresses"))),
/// )?;
///
/// let u = mgr.new_instance(user)?;
/// let a = mgr.new_instance(address)?;
/// mgr.append(u, "addresses", Value::Ref(a))?;
/// assert_eq!(mgr.get(a, "user")?, Value::Ref(u));
/// # Ok::<(), attrscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct BackrefExtension {
    mirror_key: String,
}

impl BackrefExtension {
    /// Creates a backref extension mirroring onto `mirror_key` of the related
    /// instance's class.
    #[must_use]
    pub fn new(mirror_key: &str) -> Self {
        Self {
            mirror_key: mirror_key.to_string(),
        }
    }

    /// The mirrored attribute key.
    #[must_use]
    pub fn mirror_key(&self) -> &str {
        &self.mirror_key
    }

    /// Makes `related.mirror_key` reference `owner`, unless it already does.
    fn attach(&self, mgr: &mut AttributeManager, related: InstanceId, owner: InstanceId) -> Result<()> {
        // A dead related handle has no mirror to maintain.
        let Ok(class) = mgr.class_of(related) else {
            return Ok(());
        };
        let descriptor = mgr.descriptor_for(class, &self.mirror_key)?;
        match descriptor.cardinality {
            Cardinality::Scalar => {
                if mgr.get(related, &self.mirror_key)? != Value::Ref(owner) {
                    mgr.set(related, &self.mirror_key, Value::Ref(owner))?;
                }
            }
            // append is a no-op for present members, so no containment check needed
            Cardinality::Collection => {
                mgr.append(related, &self.mirror_key, Value::Ref(owner))?;
            }
        }
        Ok(())
    }

    /// Confirms the mirror descriptor resolves for `value`'s target, when
    /// `value` is a reference to a live instance.
    fn mirror_resolves(&self, mgr: &AttributeManager, value: &Value) -> Result<()> {
        let Some(related) = value.as_ref_id() else {
            return Ok(());
        };
        let Ok(class) = mgr.class_of(related) else {
            return Ok(());
        };
        mgr.descriptor_for(class, &self.mirror_key)?;
        Ok(())
    }

    /// Clears `owner` out of `related.mirror_key`, unless that side has
    /// already been independently updated.
    fn detach(&self, mgr: &mut AttributeManager, related: InstanceId, owner: InstanceId) -> Result<()> {
        // The related side may have been dropped mid-cascade; nothing to do then.
        let Ok(class) = mgr.class_of(related) else {
            return Ok(());
        };
        let descriptor = mgr.descriptor_for(class, &self.mirror_key)?;
        match descriptor.cardinality {
            Cardinality::Scalar => {
                if mgr.get(related, &self.mirror_key)? == Value::Ref(owner) {
                    mgr.set(related, &self.mirror_key, Value::Null)?;
                }
            }
            Cardinality::Collection => {
                if mgr.contains(related, &self.mirror_key, &Value::Ref(owner))? {
                    mgr.remove(related, &self.mirror_key, &Value::Ref(owner))?;
                }
            }
        }
        Ok(())
    }
}

impl AttributeExtension for BackrefExtension {
    fn check(
        &self,
        mgr: &AttributeManager,
        _owner: InstanceId,
        _key: &str,
        item: &Value,
        previous: Option<&Value>,
        op: ChangeOp,
    ) -> Result<()> {
        if let (ChangeOp::Replace, Some(prev)) = (op, previous) {
            if prev != item {
                self.mirror_resolves(mgr, prev)?;
            }
        }
        self.mirror_resolves(mgr, item)
    }

    fn on_change(
        &self,
        mgr: &mut AttributeManager,
        owner: InstanceId,
        _key: &str,
        item: &Value,
        previous: Option<&Value>,
        op: ChangeOp,
    ) -> Result<()> {
        match op {
            ChangeOp::Add => {
                if let Value::Ref(related) = item {
                    self.attach(mgr, *related, owner)?;
                }
            }
            ChangeOp::Remove => {
                if let Value::Ref(related) = item {
                    self.detach(mgr, *related, owner)?;
                }
            }
            ChangeOp::Replace => {
                if let Some(Value::Ref(prev)) = previous {
                    if previous != Some(item) {
                        self.detach(mgr, *prev, owner)?;
                    }
                }
                if let Value::Ref(related) = item {
                    self.attach(mgr, *related, owner)?;
                }
            }
        }
        Ok(())
    }
}
