//! The attribute manager: registry and façade.
//!
//! This module provides [`AttributeManager`], the single entry point of the
//! engine. It owns three side tables:
//!
//! - The class hierarchy registry ([`crate::model::ClassRegistry`])
//! - The descriptor registry, keyed by (defining class, key)
//! - Per-instance attribute state and parent markers, keyed by
//!   [`crate::model::InstanceId`]
//!
//! # Descriptor Resolution
//!
//! The effective descriptor for an instance is resolved against its *runtime*
//! class: the ancestor chain is walked from most-derived to least-derived and
//! the first registration wins. A subclass can therefore override behavior for
//! one inherited key while leaving the rest of the inherited keys untouched.
//!
//! # Mutation Pipeline
//!
//! Every mutating operation follows the same shape: resolve the descriptor,
//! validate everything that can fail (including every extension's pre-flight
//! check), apply the structural change, maintain parent markers, then fire
//! extensions in registration order. Validation failures are raised before
//! any state change or extension side effect, so a failed operation never
//! leaves an instance partially mutated.
//!
//! # Thread Safety
//!
//! [`AttributeManager`] is neither [`Send`] nor [`Sync`]: descriptors hold
//! `Rc` handles to extensions and loaders, and the engine is specified as a
//! single-threaded, synchronous component. Embedding applications own one
//! manager per object-graph scope; there is no process-wide singleton.

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{
    model::{ClassId, ClassRegistry, InstanceId, Value},
    tracking::{
        AttributeDescriptor, AttributeOptions, AttributeState, Cardinality, ChangeOp, History,
        Loaded, Population, Slot, TrackedCollection,
    },
    Error, Result,
};

/// Side-table entry for one tracked instance.
pub(crate) struct InstanceData {
    /// Runtime class of the instance
    pub(crate) class: ClassId,
    /// Lazily created per-key attribute state
    pub(crate) attributes: HashMap<String, AttributeState>,
    /// Parent markers set on this instance *as a member*: (owner, key) pairs
    /// of parent-tracked collections that currently contain it
    pub(crate) markers: HashSet<(InstanceId, String)>,
}

/// The registry and façade for attribute instrumentation and change tracking.
///
/// See the [module documentation](self) for the overall design. All
/// operations are synchronous and complete before returning, including lazy
/// loads and cascading extension side effects.
///
/// # Usage Examples
///
/// ```rust
/// use attrscope::prelude::*;
///
/// let mut mgr = AttributeManager::new();
/// let order = mgr.declare_class("Order", None)?;
/// mgr.register(order, "items", Cardinality::Collection, AttributeOptions::new())?;
///
/// let o = mgr.new_instance(order)?;
/// mgr.append(o, "items", Value::from("book"))?;
/// assert_eq!(mgr.history(o, "items")?.added, vec![Value::from("book")]);
///
/// mgr.commit(&[o])?;
/// assert!(mgr.history(o, "items")?.is_empty());
/// # Ok::<(), attrscope::Error>(())
/// ```
#[derive(Default)]
pub struct AttributeManager {
    pub(crate) classes: ClassRegistry,
    pub(crate) descriptors: HashMap<ClassId, HashMap<String, Rc<AttributeDescriptor>>>,
    pub(crate) instances: Vec<Option<InstanceData>>,
}

impl AttributeManager {
    /// Creates an empty manager: no classes, no descriptors, no instances.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ============================================================================================
    // Classes and instances
    // ============================================================================================

    /// Declares a class, optionally inheriting from a previously declared
    /// parent.
    ///
    /// # Errors
    /// [`Error::Configuration`] for an empty or duplicate name,
    /// [`Error::InvalidHandle`] for an unknown parent handle.
    pub fn declare_class(&mut self, name: &str, parent: Option<ClassId>) -> Result<ClassId> {
        self.classes.declare(name, parent)
    }

    /// Read access to the class hierarchy registry.
    #[must_use]
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Creates a tracked instance of `class` and returns its handle.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] if `class` was not declared here.
    pub fn new_instance(&mut self, class: ClassId) -> Result<InstanceId> {
        self.classes.name(class)?;
        let id = InstanceId(
            u32::try_from(self.instances.len())
                .map_err(|_| Error::InvalidHandle("instance table exhausted".to_string()))?,
        );
        self.instances.push(Some(InstanceData {
            class,
            attributes: HashMap::new(),
            markers: HashSet::new(),
        }));
        Ok(id)
    }

    /// Destroys an instance together with all of its attribute state.
    ///
    /// Parent markers held by the instance die with it; markers on *other*
    /// instances that point at the dropped owner simply stop answering
    /// [`Self::has_parent`] positively, since the owner is no longer live.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] if the handle is stale or foreign.
    pub fn drop_instance(&mut self, instance: InstanceId) -> Result<()> {
        let slot = self
            .instances
            .get_mut(instance.index())
            .ok_or_else(|| Error::InvalidHandle(format!("{instance} was never issued here")))?;
        if slot.take().is_none() {
            return Err(Error::InvalidHandle(format!("{instance} is already dropped")));
        }
        Ok(())
    }

    /// Returns true if `instance` is a live handle of this manager.
    #[must_use]
    pub fn is_live(&self, instance: InstanceId) -> bool {
        self.instances
            .get(instance.index())
            .is_some_and(Option::is_some)
    }

    /// The runtime class of `instance`.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] if the handle is stale or foreign.
    pub fn class_of(&self, instance: InstanceId) -> Result<ClassId> {
        Ok(self.instance_data(instance)?.class)
    }

    /// Number of live instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.iter().filter(|slot| slot.is_some()).count()
    }

    // ============================================================================================
    // Descriptor registry
    // ============================================================================================

    /// Registers an attribute descriptor for `(class, key)`.
    ///
    /// Re-registering the same pair replaces the descriptor for that class
    /// only; registrations on subclasses remain independent. Loader arity is
    /// deliberately *not* validated here - a loader whose result contradicts
    /// the cardinality fails with [`Error::Configuration`] at first load.
    ///
    /// # Errors
    /// [`Error::Configuration`] for an empty key, or for scalar-only options
    /// (`mutable_scalar_copy`, `default`) on a collection attribute.
    /// [`Error::InvalidHandle`] if `class` was not declared here.
    pub fn register(
        &mut self,
        class: ClassId,
        key: &str,
        cardinality: Cardinality,
        options: AttributeOptions,
    ) -> Result<Rc<AttributeDescriptor>> {
        self.classes.name(class)?;
        if key.is_empty() {
            return Err(Error::Configuration(
                "attribute keys must be non-empty".to_string(),
            ));
        }
        if cardinality == Cardinality::Collection {
            if options.mutable_scalar_copy.is_some() {
                return Err(Error::Configuration(format!(
                    "mutable_scalar_copy is only valid for scalar attributes (key '{key}')"
                )));
            }
            if options.default.is_some() {
                return Err(Error::Configuration(format!(
                    "defaults are only valid for scalar attributes (key '{key}')"
                )));
            }
        }

        let descriptor = Rc::new(AttributeDescriptor {
            defining_class: class,
            key: key.to_string(),
            cardinality,
            options,
        });
        self.descriptors
            .entry(class)
            .or_default()
            .insert(key.to_string(), descriptor.clone());
        Ok(descriptor)
    }

    /// Removes every descriptor whose defining class is exactly `class`.
    ///
    /// Subclass registrations and all per-instance state are left untouched;
    /// removal never invokes any attribute logic. A class without
    /// registrations is a no-op.
    pub fn unregister(&mut self, class: ClassId) {
        self.descriptors.remove(&class);
    }

    /// Resolves the effective descriptor for `(class, key)` by walking the
    /// ancestor chain from most-derived to least-derived.
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`] if no ancestor carries a registration,
    /// [`Error::InvalidHandle`] for an unknown class handle.
    pub fn descriptor_for(&self, class: ClassId, key: &str) -> Result<Rc<AttributeDescriptor>> {
        for ancestor in self.classes.ancestors(class)? {
            if let Some(found) = self.descriptors.get(ancestor).and_then(|table| table.get(key)) {
                return Ok(found.clone());
            }
        }
        Err(Error::UnknownAttribute {
            class: self.classes.name(class)?.to_string(),
            key: key.to_string(),
        })
    }

    // ============================================================================================
    // Scalar access
    // ============================================================================================

    /// Reads the live value of a scalar attribute.
    ///
    /// Triggers the lazy loader if the attribute is pending; the loaded value
    /// becomes both the live value and the committed baseline, so a freshly
    /// loaded attribute is unmodified. Before any assignment the registered
    /// default (or [`Value::Null`]) is returned.
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`], [`Error::UnsupportedOperation`] for
    /// collection attributes, [`Error::Configuration`] on loader arity
    /// mismatch.
    pub fn get(&mut self, instance: InstanceId, key: &str) -> Result<Value> {
        self.checked_descriptor(instance, key, Cardinality::Scalar)?;
        self.ensure_loaded(instance, key)?;
        match &self.state(instance, key)?.current {
            Slot::Scalar(value) => Ok(value.clone()),
            Slot::Collection(_) => Err(malformed_error!(
                "scalar attribute '{}' holds a collection slot",
                key
            )),
        }
    }

    /// Replaces the live value of a scalar attribute.
    ///
    /// Setting the value an attribute already holds is a no-op: no history
    /// change, no extension firing. Otherwise extensions run with
    /// [`ChangeOp::Replace`] and the previous value, so a backref can detach
    /// the old partner before attaching the new one. Setting a pending
    /// attribute cancels the lazy load without invoking the loader.
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`], [`Error::UnsupportedOperation`] for
    /// collection attributes. An extension pre-flight failure (e.g. a backref
    /// mirror that does not resolve on the related class) is raised before
    /// any state change.
    pub fn set(&mut self, instance: InstanceId, key: &str, value: Value) -> Result<()> {
        self.checked_descriptor(instance, key, Cardinality::Scalar)?;
        let descriptor = self.ensure_state(instance, key)?;

        let previous = {
            let state = self.state(instance, key)?;
            let Slot::Scalar(previous) = state.current.clone() else {
                return Err(malformed_error!(
                    "scalar attribute '{}' holds a collection slot",
                    key
                ));
            };
            if state.population == Population::Populated && previous == value {
                return Ok(());
            }
            previous
        };
        self.check_extensions(&descriptor, instance, key, &value, Some(&previous), ChangeOp::Replace)?;

        {
            let state = self.state_mut(instance, key)?;
            state.current = Slot::Scalar(value.clone());
            state.population = Population::Populated;
        }
        self.fire(&descriptor, instance, key, &value, Some(&previous), ChangeOp::Replace)
    }

    // ============================================================================================
    // Collection access
    // ============================================================================================

    /// Reads the live tracked collection of a collection attribute.
    ///
    /// The returned reference is the live collection: mutations through
    /// [`Self::append`]/[`Self::remove`] are visible to later reads on the
    /// same instance. Triggers the lazy loader if pending.
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`], [`Error::UnsupportedOperation`] for
    /// scalar attributes, [`Error::Configuration`] on loader arity mismatch.
    pub fn get_collection(&mut self, instance: InstanceId, key: &str) -> Result<&TrackedCollection> {
        self.checked_descriptor(instance, key, Cardinality::Collection)?;
        self.ensure_loaded(instance, key)?;
        match &self.state(instance, key)?.current {
            Slot::Collection(collection) => Ok(collection),
            Slot::Scalar(_) => Err(malformed_error!(
                "collection attribute '{}' holds a scalar slot",
                key
            )),
        }
    }

    /// Clones the members of a collection attribute out into a plain vector.
    ///
    /// # Errors
    /// Same as [`Self::get_collection`].
    pub fn collection_items(&mut self, instance: InstanceId, key: &str) -> Result<Vec<Value>> {
        Ok(self.get_collection(instance, key)?.to_vec())
    }

    /// Returns true if `item` is currently a member of the collection.
    ///
    /// # Errors
    /// Same as [`Self::get_collection`].
    pub fn contains(&mut self, instance: InstanceId, key: &str, item: &Value) -> Result<bool> {
        Ok(self.get_collection(instance, key)?.contains(item))
    }

    /// Appends `item` to a collection attribute.
    ///
    /// Appending an already-present member is a no-op: the member is not
    /// duplicated, history is unchanged, and no extension fires - this is
    /// also what terminates backref propagation cycles. Otherwise the member
    /// is inserted at the end, the parent marker is set when the descriptor
    /// tracks parents, and extensions run with [`ChangeOp::Add`].
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`], [`Error::UnsupportedOperation`] for
    /// scalar attributes, [`Error::InvalidHandle`] when a parent-tracked
    /// member handle is dead. Extension pre-flight failures are raised before
    /// any mutation, like the handle check.
    pub fn append(&mut self, instance: InstanceId, key: &str, item: Value) -> Result<()> {
        self.checked_descriptor(instance, key, Cardinality::Collection)?;
        let descriptor = self.ensure_loaded(instance, key)?;

        let child = item.as_ref_id();
        if descriptor.tracks_parent() {
            if let Some(child) = child {
                self.instance_data(child)?;
            }
        }

        {
            let state = self.state(instance, key)?;
            let Slot::Collection(collection) = &state.current else {
                return Err(malformed_error!(
                    "collection attribute '{}' holds a scalar slot",
                    key
                ));
            };
            if collection.contains(&item) {
                return Ok(());
            }
        }
        self.check_extensions(&descriptor, instance, key, &item, None, ChangeOp::Add)?;

        {
            let state = self.state_mut(instance, key)?;
            let Slot::Collection(collection) = &mut state.current else {
                return Err(malformed_error!(
                    "collection attribute '{}' holds a scalar slot",
                    key
                ));
            };
            collection.push(item.clone());
            state.population = Population::Populated;
        }

        if descriptor.tracks_parent() {
            if let Some(child) = child {
                if let Ok(data) = self.instance_data_mut(child) {
                    data.markers.insert((instance, key.to_string()));
                }
            }
        }
        self.fire(&descriptor, instance, key, &item, None, ChangeOp::Add)
    }

    /// Removes `item` from a collection attribute, preserving the order of
    /// the remaining members.
    ///
    /// Clears the parent marker when the descriptor tracks parents and runs
    /// extensions with [`ChangeOp::Remove`].
    ///
    /// # Errors
    /// [`Error::NotFound`] if `item` is not a member - raised, like extension
    /// pre-flight failures, before any marker change or membership mutation.
    /// Also [`Error::UnknownAttribute`] and [`Error::UnsupportedOperation`]
    /// as for [`Self::append`].
    pub fn remove(&mut self, instance: InstanceId, key: &str, item: &Value) -> Result<()> {
        self.checked_descriptor(instance, key, Cardinality::Collection)?;
        let descriptor = self.ensure_loaded(instance, key)?;

        let index = {
            let state = self.state(instance, key)?;
            let Slot::Collection(collection) = &state.current else {
                return Err(malformed_error!(
                    "collection attribute '{}' holds a scalar slot",
                    key
                ));
            };
            let Some(index) = collection.position(item) else {
                return Err(Error::NotFound(format!(
                    "{item} is not a member of attribute '{key}'"
                )));
            };
            index
        };
        self.check_extensions(&descriptor, instance, key, item, None, ChangeOp::Remove)?;

        {
            let state = self.state_mut(instance, key)?;
            let Slot::Collection(collection) = &mut state.current else {
                return Err(malformed_error!(
                    "collection attribute '{}' holds a scalar slot",
                    key
                ));
            };
            collection.remove_at(index);
            state.population = Population::Populated;
        }

        if descriptor.tracks_parent() {
            if let Some(child) = item.as_ref_id() {
                if let Ok(data) = self.instance_data_mut(child) {
                    data.markers.remove(&(instance, key.to_string()));
                }
            }
        }
        self.fire(&descriptor, instance, key, item, None, ChangeOp::Remove)
    }

    /// Reassigns a collection attribute wholesale.
    ///
    /// Defined as: remove every current member (firing the same side effects
    /// as individual [`Self::remove`] calls), then append every new member in
    /// order (firing the same side effects as individual [`Self::append`]
    /// calls). Members a backref cascade has already moved are skipped by the
    /// usual containment guards.
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`], [`Error::UnsupportedOperation`] for
    /// scalar attributes.
    pub fn assign(&mut self, instance: InstanceId, key: &str, items: Vec<Value>) -> Result<()> {
        self.checked_descriptor(instance, key, Cardinality::Collection)?;
        self.ensure_loaded(instance, key)?;

        let existing = self.collection_items(instance, key)?;
        for member in existing {
            if self.contains(instance, key, &member)? {
                self.remove(instance, key, &member)?;
            }
        }
        for item in items {
            self.append(instance, key, item)?;
        }
        Ok(())
    }

    /// Answers "is `item` still attached to `owner.key`".
    ///
    /// True when the member carries a marker for `(owner, key)` and the owner
    /// is live. With `optimistic` set, a membership that cannot be known yet -
    /// because the owner side still has an unconsumed lazy loader - is
    /// answered positively *without* forcing the load. The optimistic answer
    /// is best-effort and becomes authoritative once either side is loaded.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] if `item` is stale or foreign.
    pub fn has_parent(
        &self,
        owner: InstanceId,
        key: &str,
        item: InstanceId,
        optimistic: bool,
    ) -> Result<bool> {
        let marker = (owner, key.to_string());
        if self.instance_data(item)?.markers.contains(&marker) {
            return Ok(self.is_live(owner));
        }
        if optimistic {
            if let Ok(owner_data) = self.instance_data(owner) {
                if let Ok(descriptor) = self.descriptor_for(owner_data.class, key) {
                    if descriptor.has_loader() {
                        let populated = owner_data
                            .attributes
                            .get(key)
                            .is_some_and(|state| state.population == Population::Populated);
                        if !populated {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    // ============================================================================================
    // Unit of work
    // ============================================================================================

    /// Fixes the baseline of every touched attribute on the given instances.
    ///
    /// For each touched attribute, `committed` becomes a snapshot of the live
    /// value: through the mutable-scalar copy strategy when one is
    /// configured, shared by reference otherwise. Attributes still pending a
    /// lazy load keep their loader; untouched attributes are skipped, so
    /// committing untouched instances never fails.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] for stale or foreign instance handles.
    pub fn commit(&mut self, instances: &[InstanceId]) -> Result<()> {
        for &instance in instances {
            let class = self.instance_data(instance)?.class;
            for key in self.touched_keys(instance)? {
                let Ok(descriptor) = self.descriptor_for(class, &key) else {
                    // descriptor was unregistered after the attribute was touched
                    continue;
                };
                let copy = descriptor.options.mutable_scalar_copy.clone();
                let Some(state) = self
                    .instance_data_mut(instance)?
                    .attributes
                    .get_mut(&key)
                else {
                    continue;
                };
                if state.population != Population::Populated {
                    continue;
                }
                state.committed = Some(state.current.commit_snapshot(copy.as_ref()));
            }
        }
        Ok(())
    }

    /// Discards uncommitted changes on the given instances.
    ///
    /// Every touched attribute reverts to its committed baseline; attributes
    /// whose baseline is unset revert to the pre-registration default (scalar
    /// default or empty collection) and, when a loader is registered, back to
    /// the pending-lazy-load state. Collection rollback restores exact prior
    /// membership, including re-establishing parent markers that removals had
    /// cleared. No extensions fire.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] for stale or foreign instance handles.
    pub fn rollback(&mut self, instances: &[InstanceId]) -> Result<()> {
        for &instance in instances {
            let class = self.instance_data(instance)?.class;
            for key in self.touched_keys(instance)? {
                let Ok(descriptor) = self.descriptor_for(class, &key) else {
                    continue;
                };
                let track = descriptor.cardinality == Cardinality::Collection
                    && descriptor.tracks_parent();

                let (before, after) = {
                    let Some(state) = self
                        .instance_data_mut(instance)?
                        .attributes
                        .get_mut(&key)
                    else {
                        continue;
                    };
                    let before = if track { member_refs(&state.current) } else { Vec::new() };
                    match state.committed.clone() {
                        Some(slot) => {
                            state.current = slot;
                            state.population = Population::Populated;
                        }
                        None => {
                            state.current = default_slot(&descriptor);
                            state.population = if descriptor.has_loader() {
                                Population::PendingLazyLoad
                            } else {
                                Population::Uninitialized
                            };
                        }
                    }
                    let after = if track { member_refs(&state.current) } else { Vec::new() };
                    (before, after)
                };

                for child in &before {
                    if !after.contains(child) {
                        if let Ok(data) = self.instance_data_mut(*child) {
                            data.markers.remove(&(instance, key.clone()));
                        }
                    }
                }
                for child in &after {
                    if let Ok(data) = self.instance_data_mut(*child) {
                        data.markers.insert((instance, key.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    // ============================================================================================
    // History and dirty detection
    // ============================================================================================

    /// Computes the added/unchanged/deleted history for `(instance, key)`.
    ///
    /// Always computed fresh against the current baseline; attributes that
    /// are untouched or still pending a lazy load report an empty history
    /// (the loader is *not* invoked).
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`] if the key resolves to no descriptor,
    /// [`Error::InvalidHandle`] for stale handles.
    pub fn history(&self, instance: InstanceId, key: &str) -> Result<History> {
        let class = self.instance_data(instance)?.class;
        self.descriptor_for(class, key)?;

        let Some(state) = self.instance_data(instance)?.attributes.get(key) else {
            return Ok(History::default());
        };
        if state.population != Population::Populated {
            return Ok(History::default());
        }
        match &state.current {
            Slot::Scalar(current) => {
                let committed = state.committed.as_ref().and_then(|slot| match slot {
                    Slot::Scalar(value) => Some(value),
                    Slot::Collection(_) => None,
                });
                Ok(History::of_scalar(current, committed))
            }
            Slot::Collection(collection) => {
                let committed: Option<Vec<Value>> =
                    state.committed.as_ref().map(Slot::members);
                Ok(History::of_collection(
                    collection.as_slice(),
                    committed.as_deref(),
                ))
            }
        }
    }

    /// Returns true if any attribute of `instance` has pending changes.
    ///
    /// An attribute counts as modified when its history has non-empty
    /// added/deleted sets; for mutable scalars committed through a copy
    /// strategy that is exactly "current compares unequal to the committed
    /// snapshot".
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] for stale or foreign instance handles.
    pub fn is_modified(&self, instance: InstanceId) -> Result<bool> {
        let data = self.instance_data(instance)?;
        for key in data.attributes.keys() {
            if let Ok(history) = self.history(instance, key) {
                if !history.is_empty() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Per-attribute variant of [`Self::is_modified`].
    ///
    /// # Errors
    /// Same as [`Self::history`].
    pub fn is_attribute_modified(&self, instance: InstanceId, key: &str) -> Result<bool> {
        Ok(!self.history(instance, key)?.is_empty())
    }

    /// The touched attribute keys of `instance`, sorted.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] for stale or foreign instance handles.
    pub fn touched_keys(&self, instance: InstanceId) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .instance_data(instance)?
            .attributes
            .iter()
            .filter(|(_, state)| state.is_touched())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    // ============================================================================================
    // Internals
    // ============================================================================================

    pub(crate) fn instance_data(&self, instance: InstanceId) -> Result<&InstanceData> {
        self.instances
            .get(instance.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::InvalidHandle(format!("{instance} is not live here")))
    }

    pub(crate) fn instance_data_mut(&mut self, instance: InstanceId) -> Result<&mut InstanceData> {
        self.instances
            .get_mut(instance.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvalidHandle(format!("{instance} is not live here")))
    }

    /// Resolves the descriptor and rejects operations whose cardinality does
    /// not match, before any state is created or loaded.
    fn checked_descriptor(
        &self,
        instance: InstanceId,
        key: &str,
        want: Cardinality,
    ) -> Result<Rc<AttributeDescriptor>> {
        let class = self.instance_data(instance)?.class;
        let descriptor = self.descriptor_for(class, key)?;
        if descriptor.cardinality != want {
            return Err(Error::UnsupportedOperation(format!(
                "{want} operation on {} attribute '{key}'",
                descriptor.cardinality
            )));
        }
        Ok(descriptor)
    }

    fn state(&self, instance: InstanceId, key: &str) -> Result<&AttributeState> {
        self.instance_data(instance)?
            .attributes
            .get(key)
            .ok_or_else(|| malformed_error!("no tracked state for attribute '{}'", key))
    }

    fn state_mut(&mut self, instance: InstanceId, key: &str) -> Result<&mut AttributeState> {
        self.instance_data_mut(instance)?
            .attributes
            .get_mut(key)
            .ok_or_else(|| malformed_error!("no tracked state for attribute '{}'", key))
    }

    /// Creates the attribute state on first touch; returns the resolved
    /// descriptor.
    fn ensure_state(&mut self, instance: InstanceId, key: &str) -> Result<Rc<AttributeDescriptor>> {
        let class = self.instance_data(instance)?.class;
        let descriptor = self.descriptor_for(class, key)?;
        let data = self.instance_data_mut(instance)?;
        if !data.attributes.contains_key(key) {
            let current = default_slot(&descriptor);
            let population = if descriptor.has_loader() {
                Population::PendingLazyLoad
            } else {
                Population::Uninitialized
            };
            data.attributes.insert(
                key.to_string(),
                AttributeState {
                    current,
                    committed: None,
                    population,
                },
            );
        }
        Ok(descriptor)
    }

    /// [`Self::ensure_state`] plus lazy-load resolution: a pending attribute
    /// consumes its loader exactly once and the result becomes the baseline.
    fn ensure_loaded(&mut self, instance: InstanceId, key: &str) -> Result<Rc<AttributeDescriptor>> {
        let descriptor = self.ensure_state(instance, key)?;
        if self.state(instance, key)?.population != Population::PendingLazyLoad {
            return Ok(descriptor);
        }
        let Some(loader) = descriptor.options.loader.clone() else {
            return Err(malformed_error!(
                "attribute '{}' is pending a lazy load but has no loader",
                key
            ));
        };

        match (descriptor.cardinality, loader(instance)) {
            (Cardinality::Scalar, Loaded::Scalar(value)) => {
                let copy = descriptor.options.mutable_scalar_copy.clone();
                let state = self.state_mut(instance, key)?;
                state.current = Slot::Scalar(value);
                state.committed = Some(state.current.commit_snapshot(copy.as_ref()));
                state.population = Population::Populated;
            }
            (Cardinality::Collection, Loaded::Sequence(items)) => {
                let children: Vec<InstanceId> = if descriptor.tracks_parent() {
                    items.iter().filter_map(Value::as_ref_id).collect()
                } else {
                    Vec::new()
                };
                let state = self.state_mut(instance, key)?;
                state.current = Slot::Collection(TrackedCollection::from_items(items));
                state.committed = Some(state.current.commit_snapshot(None));
                state.population = Population::Populated;
                for child in children {
                    if let Ok(data) = self.instance_data_mut(child) {
                        data.markers.insert((instance, key.to_string()));
                    }
                }
            }
            (cardinality, loaded) => {
                let arity = match loaded {
                    Loaded::Scalar(_) => "a single value",
                    Loaded::Sequence(_) => "a sequence",
                };
                return Err(Error::Configuration(format!(
                    "lazy loader for attribute '{key}' returned {arity} but the attribute is \
                     registered as {cardinality}"
                )));
            }
        }
        Ok(descriptor)
    }

    /// Pre-flight pass over the descriptor's extensions, in registration
    /// order. Runs before the structural change is applied, so a refusing
    /// extension aborts the operation with no state touched.
    fn check_extensions(
        &self,
        descriptor: &Rc<AttributeDescriptor>,
        owner: InstanceId,
        key: &str,
        item: &Value,
        previous: Option<&Value>,
        op: ChangeOp,
    ) -> Result<()> {
        for extension in &descriptor.options.extensions {
            extension.check(self, owner, key, item, previous, op)?;
        }
        Ok(())
    }

    /// Runs the descriptor's extensions in registration order. Side effects
    /// complete before the triggering mutation returns.
    fn fire(
        &mut self,
        descriptor: &Rc<AttributeDescriptor>,
        owner: InstanceId,
        key: &str,
        item: &Value,
        previous: Option<&Value>,
        op: ChangeOp,
    ) -> Result<()> {
        for extension in &descriptor.options.extensions {
            extension.on_change(self, owner, key, item, previous, op)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AttributeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeManager")
            .field("classes", &self.classes.len())
            .field(
                "descriptors",
                &self.descriptors.values().map(HashMap::len).sum::<usize>(),
            )
            .field("instances", &self.instance_count())
            .finish()
    }
}

fn default_slot(descriptor: &AttributeDescriptor) -> Slot {
    match descriptor.cardinality {
        Cardinality::Scalar => Slot::Scalar(
            descriptor
                .options
                .default
                .clone()
                .unwrap_or(Value::Null),
        ),
        Cardinality::Collection => Slot::Collection(TrackedCollection::new()),
    }
}

fn member_refs(slot: &Slot) -> Vec<InstanceId> {
    slot.members()
        .iter()
        .filter_map(Value::as_ref_id)
        .collect()
}
