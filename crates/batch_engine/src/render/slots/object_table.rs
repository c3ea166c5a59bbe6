//! Per-object render records
//!
//! Each live object owns one slot of the device-visible record array for as
//! long as it belongs to at least one layer. The record holds its transforms
//! and, per layer row, the binding slots of its resources.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix3, Matrix4};

use super::resource_table::ResourceTable;
use super::slot_allocator::{SlotAllocator, SlotResult};
use super::upload::DirtyRanges;
use crate::config::{MAX_LAYERS, MAX_LAYER_RESOURCES, NO_RESOURCE};
use crate::foundation::ids::{LayerId, ObjectId, ResourceId};
use crate::scene::ObjectDescriptor;

/// Table name used in diagnostics
pub const OBJECT_TABLE: &str = "object records";

/// Device-visible record of one object
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectRecord {
    /// Model matrix, column-major
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the upper 3x3, columns padded to vec4
    pub normal: [[f32; 4]; 3],
    /// Binding slots per layer row, [`NO_RESOURCE`] where unbound
    pub resources: [[u32; MAX_LAYER_RESOURCES]; MAX_LAYERS],
}

impl ObjectRecord {
    /// Record with the given transform and no resources
    pub fn new(transform: &Matrix4<f32>) -> Self {
        let mut record = Self {
            model: [[0.0; 4]; 4],
            normal: [[0.0; 4]; 3],
            resources: [[NO_RESOURCE; MAX_LAYER_RESOURCES]; MAX_LAYERS],
        };
        record.set_transform(transform);
        record
    }

    /// Rewrite both matrices from `transform`
    pub fn set_transform(&mut self, transform: &Matrix4<f32>) {
        self.model = (*transform).into();

        let linear: Matrix3<f32> = transform.fixed_view::<3, 3>(0, 0).into_owned();
        let normal = linear
            .try_inverse()
            .map_or_else(Matrix3::identity, |inverse| inverse.transpose());
        for (column, out) in normal.column_iter().zip(self.normal.iter_mut()) {
            *out = [column[0], column[1], column[2], 0.0];
        }
    }

    /// Binding slots of a layer row
    pub fn layer_resources(&self, layer: LayerId) -> Option<&[u32; MAX_LAYER_RESOURCES]> {
        self.resources.get(layer.raw() as usize)
    }
}

#[derive(Debug, Clone)]
struct ObjectEntry {
    slot: u32,
    layers: BTreeSet<LayerId>,
    // (layer, position) -> resource bound there
    bound: BTreeMap<(LayerId, usize), ResourceId>,
}

impl ObjectEntry {
    fn pairs(&self) -> BTreeSet<(LayerId, ResourceId)> {
        self.bound
            .iter()
            .map(|(&(layer, _), &resource)| (layer, resource))
            .collect()
    }
}

/// Object id to record slot, plus the record array itself
#[derive(Debug)]
pub struct ObjectRecordTable {
    slots: SlotAllocator,
    objects: HashMap<ObjectId, ObjectEntry>,
    records: Vec<ObjectRecord>,
    dirty: DirtyRanges,
}

impl ObjectRecordTable {
    /// Create a table of `capacity` records with `frames` device copies
    pub fn new(capacity: u32, frames: usize) -> Self {
        log::info!("Object record table: {} slots, {} frame copies", capacity, frames);
        Self {
            slots: SlotAllocator::new(OBJECT_TABLE, capacity),
            objects: HashMap::new(),
            records: vec![ObjectRecord::zeroed(); capacity as usize],
            dirty: DirtyRanges::new(frames),
        }
    }

    /// Write the record of `object` as a member of `layer`
    ///
    /// Allocates a slot the first time the object is seen and rewrites it in
    /// place afterwards. Resource requests of every layer the object belongs to
    /// are resolved through `resources`; bindings that disappeared since the
    /// last write are released, unchanged ones are left alone.
    ///
    /// When a reference fails the references taken by this call are released
    /// again and a newly seen object gives its slot back, so a later `remove`
    /// frees everything the table still holds for the object.
    pub fn upsert(
        &mut self,
        object: ObjectId,
        layer: LayerId,
        descriptor: &ObjectDescriptor,
        resources: &mut ResourceTable,
    ) -> SlotResult<u32> {
        if layer.raw() as usize >= MAX_LAYERS {
            log::warn!("{} is outside the {} record rows; {} gets no bindings there", layer, MAX_LAYERS, object);
        }

        let fresh = !self.objects.contains_key(&object);
        let entry = match self.objects.entry(object) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let slot = self.slots.allocate()?;
                log::trace!("{} -> record slot {}", object, slot);
                vacant.insert(ObjectEntry {
                    slot,
                    layers: BTreeSet::new(),
                    bound: BTreeMap::new(),
                })
            }
        };
        entry.layers.insert(layer);

        let mut wanted: BTreeMap<(LayerId, usize), (ResourceId, _)> = BTreeMap::new();
        for &member in entry.layers.iter().filter(|l| (l.raw() as usize) < MAX_LAYERS) {
            for (position, request) in descriptor.resources_for(member).iter().enumerate() {
                if let Some(request) = request {
                    wanted.insert((member, position), (request.resource, request.descriptor));
                }
            }
        }

        // Release first so a swap cannot exhaust the table
        let old_pairs = entry.pairs();
        let new_pairs: BTreeSet<(LayerId, ResourceId)> = wanted
            .iter()
            .map(|(&(member, _), &(resource, _))| (member, resource))
            .collect();
        for &(member, resource) in old_pairs.difference(&new_pairs) {
            resources.release_layer(resource, object, member)?;
        }

        let slot = entry.slot;
        let mut record = ObjectRecord::new(&descriptor.transform);
        let mut bound = BTreeMap::new();
        for (&(member, position), &(resource, binding)) in &wanted {
            match resources.reference(resource, &binding, object, member) {
                Ok(resource_slot) => {
                    record.resources[member.raw() as usize][position] = resource_slot;
                    bound.insert((member, position), resource);
                }
                Err(error) => {
                    // Undo this write's new references; kept pairs stay bound
                    let acquired: BTreeSet<(LayerId, ResourceId)> = bound
                        .iter()
                        .map(|(&(member, _), &resource)| (member, resource))
                        .filter(|pair| !old_pairs.contains(pair))
                        .collect();
                    for (member, resource) in acquired {
                        resources.release_layer(resource, object, member)?;
                    }
                    entry
                        .bound
                        .retain(|&(member, _), resource| new_pairs.contains(&(member, *resource)));

                    if fresh {
                        self.objects.remove(&object);
                        self.slots.free(slot)?;
                        log::trace!("{} gave back record slot {} after a failed write", object, slot);
                    }
                    return Err(error);
                }
            }
        }
        entry.bound = bound;

        self.records[slot as usize] = record;
        self.dirty.mark(slot);
        Ok(slot)
    }

    /// Remove `object` from `layer`
    ///
    /// Releases the object's resources in that layer. When the object is left
    /// in no layer its slot is freed and `true` is returned. Unknown objects
    /// and layers the object is not in are ignored.
    pub fn detach_layer(
        &mut self,
        object: ObjectId,
        layer: LayerId,
        resources: &mut ResourceTable,
    ) -> SlotResult<bool> {
        let Some(entry) = self.objects.get_mut(&object) else {
            log::trace!("Detach of unmapped {} from {}", object, layer);
            return Ok(false);
        };
        if !entry.layers.remove(&layer) {
            return Ok(false);
        }

        let released: BTreeSet<ResourceId> = entry
            .bound
            .iter()
            .filter(|((member, _), _)| *member == layer)
            .map(|(_, &resource)| resource)
            .collect();
        entry.bound.retain(|(member, _), _| *member != layer);
        for resource in released {
            resources.release_layer(resource, object, layer)?;
        }

        if entry.layers.is_empty() {
            return self.remove(object, resources);
        }

        let slot = entry.slot;
        if let Some(row) = self.records[slot as usize].resources.get_mut(layer.raw() as usize) {
            *row = [NO_RESOURCE; MAX_LAYER_RESOURCES];
        }
        self.dirty.mark(slot);
        Ok(false)
    }

    /// Drop `object` entirely, freeing its slot and every resource reference
    ///
    /// A no-op returning `false` if the object was never mapped.
    pub fn remove(&mut self, object: ObjectId, resources: &mut ResourceTable) -> SlotResult<bool> {
        let Some(entry) = self.objects.remove(&object) else {
            log::trace!("Remove of unmapped {}", object);
            return Ok(false);
        };

        let held: BTreeSet<ResourceId> = entry.bound.values().copied().collect();
        for resource in held {
            resources.release(resource, object)?;
        }

        self.slots.free(entry.slot)?;
        self.records[entry.slot as usize] = ObjectRecord::zeroed();
        self.dirty.mark(entry.slot);
        log::trace!("{} released record slot {}", object, entry.slot);
        Ok(true)
    }

    /// Record slot of `object`
    pub fn slot_of(&self, object: ObjectId) -> Option<u32> {
        self.objects.get(&object).map(|entry| entry.slot)
    }

    /// Record of `object`
    pub fn record(&self, object: ObjectId) -> Option<&ObjectRecord> {
        self.slot_of(object).map(|slot| &self.records[slot as usize])
    }

    /// Layers `object` is a member of
    pub fn layers_of(&self, object: ObjectId) -> Vec<LayerId> {
        self.objects
            .get(&object)
            .map(|entry| entry.layers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of mapped objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// No mapped objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Record capacity
    pub fn capacity(&self) -> u32 {
        self.slots.capacity()
    }

    /// Bytes of the records in `range`
    pub fn record_bytes(&self, range: Range<u32>) -> &[u8] {
        bytemuck::cast_slice(&self.records[range.start as usize..range.end as usize])
    }

    /// Drain the slot runs `frame` has not uploaded yet
    pub fn take_dirty(&mut self, frame: usize) -> Vec<Range<u32>> {
        self.dirty.take(frame)
    }
}
