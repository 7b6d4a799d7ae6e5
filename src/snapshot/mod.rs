//! Canonical serialization of tracked object graphs.
//!
//! The snapshot codec turns the reachable instance graph of an
//! [`AttributeManager`] into deterministic bytes and back. Snapshots preserve
//! live values, committed baselines, and tracked-collection membership;
//! they deliberately do *not* encode descriptors, loaders, or extensions.
//! Those are re-attached by re-registration in the restoring process, and an
//! attribute whose loader was dropped this way simply restores as populated
//! data.
//!
//! # Determinism
//!
//! Two serializations of the same state are byte-identical:
//!
//! - Instances are emitted in deterministic traversal order (roots first,
//!   then breadth-first discovery over attribute keys in sorted order)
//! - Instance handles are remapped to dense serials in that order, so the
//!   concrete [`crate::model::InstanceId`] values never leak into the bytes
//! - Attribute maps are sorted by key
//!
//! This also gives the round-trip property: serializing, restoring into a
//! fresh manager with the same class declarations, and serializing again
//! yields the same bytes.
//!
//! # Population State
//!
//! Only populated attributes are encoded. An attribute still pending a lazy
//! load is skipped without invoking the loader; after restore it is
//! uninitialized again and becomes pending only if the embedding application
//! re-registers a loader for it.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{
    model::{InstanceId, Value},
    tracking::{
        AttributeManager, AttributeState, Cardinality, Population, Slot, TrackedCollection,
    },
    Error, Result,
};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    instances: Vec<SnapInstance>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapInstance {
    class: String,
    attributes: BTreeMap<String, SnapAttribute>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapAttribute {
    current: SnapSlot,
    committed: Option<SnapSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum SnapSlot {
    Scalar(SnapValue),
    Collection(Vec<SnapValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum SnapValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Ref(u32),
    Blob(Vec<u8>),
}

impl AttributeManager {
    /// Serializes the instance graph reachable from `roots` to canonical
    /// bytes.
    ///
    /// Reachability follows [`Value::Ref`] members of both live values and
    /// committed baselines. Lazy loaders are never invoked.
    ///
    /// # Errors
    /// [`Error::InvalidHandle`] for stale root handles,
    /// [`Error::Serialization`] if JSON encoding fails.
    pub fn serialize_graph(&self, roots: &[InstanceId]) -> Result<Vec<u8>> {
        let mut order: Vec<InstanceId> = Vec::new();
        let mut serials: HashMap<InstanceId, u32> = HashMap::new();
        let mut queue: VecDeque<InstanceId> = VecDeque::new();

        for &root in roots {
            self.instance_data(root)?;
            admit(root, &mut order, &mut serials, &mut queue)?;
        }
        while let Some(instance) = queue.pop_front() {
            let data = self.instance_data(instance)?;
            let mut keys: Vec<&String> = data.attributes.keys().collect();
            keys.sort();
            for key in keys {
                let state = &data.attributes[key];
                if state.population != Population::Populated {
                    continue;
                }
                for related in slot_refs(&state.current) {
                    if self.is_live(related) {
                        admit(related, &mut order, &mut serials, &mut queue)?;
                    }
                }
                if let Some(committed) = &state.committed {
                    for related in slot_refs(committed) {
                        if self.is_live(related) {
                            admit(related, &mut order, &mut serials, &mut queue)?;
                        }
                    }
                }
            }
        }

        let mut instances = Vec::with_capacity(order.len());
        for &instance in &order {
            let data = self.instance_data(instance)?;
            let mut attributes = BTreeMap::new();
            for (key, state) in &data.attributes {
                if state.population != Population::Populated {
                    continue;
                }
                let current = encode_slot(&state.current, &serials);
                let committed = state
                    .committed
                    .as_ref()
                    .map(|slot| encode_slot(slot, &serials));
                attributes.insert(key.clone(), SnapAttribute { current, committed });
            }
            instances.push(SnapInstance {
                class: self.classes.name(data.class)?.to_string(),
                attributes,
            });
        }

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            instances,
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Restores a serialized graph into this manager as fresh instances.
    ///
    /// Classes are resolved by name and must already be declared; descriptors
    /// should be re-registered *before* restoring so parent markers for
    /// parent-tracked collections can be re-established. Returns the created
    /// handles in snapshot order (roots first).
    ///
    /// # Errors
    /// [`Error::Configuration`] if a snapshot class is not declared here,
    /// [`Error::Malformed`] for version mismatches or dangling serials,
    /// [`Error::Serialization`] if JSON decoding fails.
    pub fn deserialize_graph(&mut self, bytes: &[u8]) -> Result<Vec<InstanceId>> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(malformed_error!(
                "unsupported snapshot version {}",
                snapshot.version
            ));
        }

        // Create all instances first so forward references resolve.
        let mut ids = Vec::with_capacity(snapshot.instances.len());
        for instance in &snapshot.instances {
            let class = self.classes.by_name(&instance.class).ok_or_else(|| {
                Error::Configuration(format!(
                    "class '{}' is not declared in this manager; declare classes before restoring",
                    instance.class
                ))
            })?;
            ids.push(self.new_instance(class)?);
        }

        for (instance, &id) in snapshot.instances.iter().zip(&ids) {
            for (key, attribute) in &instance.attributes {
                let current = decode_slot(&attribute.current, &ids)?;
                let committed = match &attribute.committed {
                    Some(slot) => Some(decode_committed(slot, &attribute.current, &current, &ids)?),
                    None => None,
                };
                self.instance_data_mut(id)?.attributes.insert(
                    key.clone(),
                    AttributeState {
                        current,
                        committed,
                        population: Population::Populated,
                    },
                );
            }
        }

        // Re-establish parent markers where descriptors are already back.
        for &id in &ids {
            let class = self.instance_data(id)?.class;
            let mut keys: Vec<String> = self.instance_data(id)?.attributes.keys().cloned().collect();
            keys.sort();
            for key in keys {
                let Ok(descriptor) = self.descriptor_for(class, &key) else {
                    continue;
                };
                if descriptor.cardinality != Cardinality::Collection || !descriptor.tracks_parent()
                {
                    continue;
                }
                let members: Vec<InstanceId> = match self
                    .instance_data(id)?
                    .attributes
                    .get(&key)
                    .map(|state| &state.current)
                {
                    Some(Slot::Collection(collection)) => {
                        collection.iter().filter_map(Value::as_ref_id).collect()
                    }
                    _ => Vec::new(),
                };
                for child in members {
                    if let Ok(data) = self.instance_data_mut(child) {
                        data.markers.insert((id, key.clone()));
                    }
                }
            }
        }
        Ok(ids)
    }
}

fn admit(
    instance: InstanceId,
    order: &mut Vec<InstanceId>,
    serials: &mut HashMap<InstanceId, u32>,
    queue: &mut VecDeque<InstanceId>,
) -> Result<()> {
    if !serials.contains_key(&instance) {
        let serial = u32::try_from(order.len())
            .map_err(|_| Error::InvalidHandle("snapshot serial space exhausted".to_string()))?;
        serials.insert(instance, serial);
        order.push(instance);
        queue.push_back(instance);
    }
    Ok(())
}

fn slot_refs(slot: &Slot) -> Vec<InstanceId> {
    slot.members()
        .iter()
        .filter_map(Value::as_ref_id)
        .collect()
}

fn encode_slot(slot: &Slot, serials: &HashMap<InstanceId, u32>) -> SnapSlot {
    match slot {
        Slot::Scalar(value) => SnapSlot::Scalar(encode_value(value, serials)),
        Slot::Collection(collection) => SnapSlot::Collection(
            collection
                .iter()
                .map(|value| encode_value(value, serials))
                .collect(),
        ),
    }
}

fn encode_value(value: &Value, serials: &HashMap<InstanceId, u32>) -> SnapValue {
    match value {
        Value::Null => SnapValue::Null,
        Value::Bool(v) => SnapValue::Bool(*v),
        Value::Int(v) => SnapValue::Int(*v),
        Value::Str(v) => SnapValue::Str(v.clone()),
        // a reference whose target was dropped has no serial; it degrades to null
        Value::Ref(id) => match serials.get(id) {
            Some(serial) => SnapValue::Ref(*serial),
            None => SnapValue::Null,
        },
        Value::Blob(cell) => SnapValue::Blob(cell.borrow().clone()),
    }
}

fn decode_slot(slot: &SnapSlot, ids: &[InstanceId]) -> Result<Slot> {
    match slot {
        SnapSlot::Scalar(value) => Ok(Slot::Scalar(decode_value(value, ids)?)),
        SnapSlot::Collection(members) => {
            let mut items = Vec::with_capacity(members.len());
            for member in members {
                items.push(decode_value(member, ids)?);
            }
            Ok(Slot::Collection(TrackedCollection::from_items(items)))
        }
    }
}

/// Decodes a committed slot, re-sharing the blob payload cell with the live
/// value when the snapshot shows them as one (the shared-by-reference commit
/// of a scalar without a copy strategy).
fn decode_committed(
    snap: &SnapSlot,
    snap_current: &SnapSlot,
    current: &Slot,
    ids: &[InstanceId],
) -> Result<Slot> {
    if snap == snap_current {
        if let (SnapSlot::Scalar(SnapValue::Blob(_)), Slot::Scalar(value @ Value::Blob(_))) =
            (snap, current)
        {
            return Ok(Slot::Scalar(value.clone()));
        }
    }
    decode_slot(snap, ids)
}

fn decode_value(value: &SnapValue, ids: &[InstanceId]) -> Result<Value> {
    Ok(match value {
        SnapValue::Null => Value::Null,
        SnapValue::Bool(v) => Value::Bool(*v),
        SnapValue::Int(v) => Value::Int(*v),
        SnapValue::Str(v) => Value::Str(v.clone()),
        SnapValue::Ref(serial) => Value::Ref(
            ids.get(*serial as usize)
                .copied()
                .ok_or_else(|| malformed_error!("dangling instance serial {} in snapshot", serial))?,
        ),
        SnapValue::Blob(bytes) => Value::blob(bytes.clone()),
    })
}
