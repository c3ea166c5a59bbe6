//! Shared resource binding table
//!
//! Maps each distinct resource to one slot of the device-visible binding array
//! and tracks which (object, layer) pairs use it. An entry lives exactly as long
//! as its usage set is non-empty.
//!
//! ```text
//! ResourceTable
//!   R1 -> slot 0, usage { A: {L0}, B: {L0, L1} }
//!   R2 -> slot 1, usage { C: {L0} }
//!          │
//!          ▼
//!   bindings[0..capacity]  (uploaded per frame through DirtyRanges)
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use super::slot_allocator::{SlotAllocator, SlotResult};
use super::upload::DirtyRanges;
use crate::foundation::ids::{LayerId, ObjectId, ResourceId};
use crate::scene::ResourceDescriptor;

/// Table name used in diagnostics
pub const RESOURCE_TABLE: &str = "resource bindings";

/// Device-visible binding data of one resource slot
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ResourceBinding {
    /// Raw image view handle
    pub image_view: u64,
    /// Raw sampler handle
    pub sampler: u64,
    /// Filter mode as its numeric value
    pub filter: u32,
    /// Address mode as its numeric value
    pub address_mode: u32,
    /// Maximum anisotropy
    pub anisotropy: f32,
    /// Mip level count
    pub mip_levels: u32,
}

impl From<&ResourceDescriptor> for ResourceBinding {
    fn from(descriptor: &ResourceDescriptor) -> Self {
        Self {
            image_view: descriptor.image_view,
            sampler: descriptor.sampler,
            filter: descriptor.filter as u32,
            address_mode: descriptor.address_mode as u32,
            anisotropy: descriptor.anisotropy,
            mip_levels: descriptor.mip_levels,
        }
    }
}

/// Slot and users of one live resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Slot in the binding array
    pub slot: u32,
    /// Layers each object uses this resource in
    pub usage: BTreeMap<ObjectId, BTreeSet<LayerId>>,
}

impl ResourceEntry {
    /// Number of (object, layer) pairs using the resource
    pub fn reference_count(&self) -> usize {
        self.usage.values().map(BTreeSet::len).sum()
    }
}

/// Resource identity to binding slot, with usage tracking
#[derive(Debug)]
pub struct ResourceTable {
    slots: SlotAllocator,
    entries: HashMap<ResourceId, ResourceEntry>,
    bindings: Vec<ResourceBinding>,
    dirty: DirtyRanges,
}

impl ResourceTable {
    /// Create a table of `capacity` slots with `frames` device copies
    pub fn new(capacity: u32, frames: usize) -> Self {
        log::info!("Resource table: {} slots, {} frame copies", capacity, frames);
        Self {
            slots: SlotAllocator::new(RESOURCE_TABLE, capacity),
            entries: HashMap::new(),
            bindings: vec![ResourceBinding::zeroed(); capacity as usize],
            dirty: DirtyRanges::new(frames),
        }
    }

    /// Record that `object` uses `resource` in `layer` and return its slot
    ///
    /// The first reference allocates a slot and writes `descriptor` into the
    /// binding array. Repeating an existing (object, layer) pair changes nothing.
    pub fn reference(
        &mut self,
        resource: ResourceId,
        descriptor: &ResourceDescriptor,
        object: ObjectId,
        layer: LayerId,
    ) -> SlotResult<u32> {
        if let Some(entry) = self.entries.get_mut(&resource) {
            entry.usage.entry(object).or_default().insert(layer);
            return Ok(entry.slot);
        }

        let slot = self.slots.allocate()?;
        self.bindings[slot as usize] = ResourceBinding::from(descriptor);
        self.dirty.mark(slot);

        let mut usage = BTreeMap::new();
        usage.insert(object, BTreeSet::from([layer]));
        self.entries.insert(resource, ResourceEntry { slot, usage });

        log::debug!("{} -> slot {} (first use by {} in {})", resource, slot, object, layer);
        Ok(slot)
    }

    /// Drop every layer association of `object` with `resource`
    ///
    /// Returns the freed slot when this removed the last user.
    pub fn release(&mut self, resource: ResourceId, object: ObjectId) -> SlotResult<Option<u32>> {
        let Some(entry) = self.entries.get_mut(&resource) else {
            log::trace!("Release of unknown {} by {}", resource, object);
            return Ok(None);
        };
        entry.usage.remove(&object);
        self.evict_if_unused(resource)
    }

    /// Drop the association of `object` with `resource` in `layer` only
    pub fn release_layer(
        &mut self,
        resource: ResourceId,
        object: ObjectId,
        layer: LayerId,
    ) -> SlotResult<Option<u32>> {
        let Some(entry) = self.entries.get_mut(&resource) else {
            log::trace!("Release of unknown {} by {} in {}", resource, object, layer);
            return Ok(None);
        };
        if let Some(layers) = entry.usage.get_mut(&object) {
            layers.remove(&layer);
            if layers.is_empty() {
                entry.usage.remove(&object);
            }
        }
        self.evict_if_unused(resource)
    }

    fn evict_if_unused(&mut self, resource: ResourceId) -> SlotResult<Option<u32>> {
        let unused = self
            .entries
            .get(&resource)
            .is_some_and(|entry| entry.usage.is_empty());
        if !unused {
            return Ok(None);
        }

        let Some(entry) = self.entries.remove(&resource) else {
            return Ok(None);
        };
        self.slots.free(entry.slot)?;
        self.bindings[entry.slot as usize] = ResourceBinding::zeroed();
        self.dirty.mark(entry.slot);
        log::debug!("{} released slot {}", resource, entry.slot);
        Ok(Some(entry.slot))
    }

    /// Slot of `resource` if it is live
    pub fn slot_of(&self, resource: ResourceId) -> Option<u32> {
        self.entries.get(&resource).map(|entry| entry.slot)
    }

    /// Entry of `resource` if it is live
    pub fn entry(&self, resource: ResourceId) -> Option<&ResourceEntry> {
        self.entries.get(&resource)
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No live resources
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot capacity
    pub fn capacity(&self) -> u32 {
        self.slots.capacity()
    }

    /// The full binding array
    pub fn bindings(&self) -> &[ResourceBinding] {
        &self.bindings
    }

    /// Bytes of the bindings in `range`
    pub fn binding_bytes(&self, range: Range<u32>) -> &[u8] {
        bytemuck::cast_slice(&self.bindings[range.start as usize..range.end as usize])
    }

    /// Drain the slot runs `frame` has not uploaded yet
    pub fn take_dirty(&mut self, frame: usize) -> Vec<Range<u32>> {
        self.dirty.take(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::slots::SlotError;

    const L0: LayerId = LayerId(0);
    const L1: LayerId = LayerId(1);

    fn descriptor(handle: u64) -> ResourceDescriptor {
        ResourceDescriptor::new(handle, handle + 100)
    }

    #[test]
    fn test_reference_is_idempotent() {
        let mut table = ResourceTable::new(4, 1);
        let first = table.reference(ResourceId(1), &descriptor(1), ObjectId(0), L0).unwrap();
        let again = table.reference(ResourceId(1), &descriptor(1), ObjectId(0), L0).unwrap();
        assert_eq!(first, again);
        assert_eq!(table.entry(ResourceId(1)).unwrap().reference_count(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_binding_written_on_first_reference() {
        let mut table = ResourceTable::new(4, 2);
        let slot = table.reference(ResourceId(3), &descriptor(7), ObjectId(0), L0).unwrap();
        let binding = table.bindings()[slot as usize];
        assert_eq!(binding.image_view, 7);
        assert_eq!(binding.sampler, 107);
        assert_eq!(table.take_dirty(0), vec![slot..slot + 1]);
        assert_eq!(table.take_dirty(1), vec![slot..slot + 1]);
        assert_eq!(
            table.binding_bytes(slot..slot + 1).len(),
            std::mem::size_of::<ResourceBinding>()
        );

        // A second user does not rewrite the binding
        table.reference(ResourceId(3), &descriptor(7), ObjectId(1), L0).unwrap();
        assert!(table.take_dirty(0).is_empty());
    }

    #[test]
    fn test_release_layer_keeps_other_layers() {
        let mut table = ResourceTable::new(4, 1);
        table.reference(ResourceId(1), &descriptor(1), ObjectId(0), L0).unwrap();
        table.reference(ResourceId(1), &descriptor(1), ObjectId(0), L1).unwrap();

        assert_eq!(table.release_layer(ResourceId(1), ObjectId(0), L0).unwrap(), None);
        let usage = &table.entry(ResourceId(1)).unwrap().usage;
        assert_eq!(usage[&ObjectId(0)], BTreeSet::from([L1]));

        assert_eq!(table.release_layer(ResourceId(1), ObjectId(0), L1).unwrap(), Some(0));
        assert!(table.is_empty());
    }

    #[test]
    fn test_release_drops_all_layers_of_object() {
        let mut table = ResourceTable::new(4, 1);
        table.reference(ResourceId(1), &descriptor(1), ObjectId(0), L0).unwrap();
        table.reference(ResourceId(1), &descriptor(1), ObjectId(0), L1).unwrap();
        table.reference(ResourceId(1), &descriptor(1), ObjectId(1), L0).unwrap();

        assert_eq!(table.release(ResourceId(1), ObjectId(0)).unwrap(), None);
        assert_eq!(table.entry(ResourceId(1)).unwrap().reference_count(), 1);
        assert_eq!(table.release(ResourceId(1), ObjectId(1)).unwrap(), Some(0));
        assert!(table.slot_of(ResourceId(1)).is_none());
    }

    #[test]
    fn test_release_of_unknown_is_noop() {
        let mut table = ResourceTable::new(2, 1);
        assert_eq!(table.release(ResourceId(9), ObjectId(0)).unwrap(), None);
        table.reference(ResourceId(1), &descriptor(1), ObjectId(0), L0).unwrap();
        assert_eq!(table.release(ResourceId(1), ObjectId(5)).unwrap(), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut table = ResourceTable::new(2, 1);
        table.reference(ResourceId(1), &descriptor(1), ObjectId(0), L0).unwrap();
        table.reference(ResourceId(2), &descriptor(2), ObjectId(0), L0).unwrap();
        let err = table
            .reference(ResourceId(3), &descriptor(3), ObjectId(0), L0)
            .unwrap_err();
        assert_eq!(
            err,
            SlotError::CapacityExhausted { table: RESOURCE_TABLE, capacity: 2 }
        );
        // Existing resources still resolve
        assert_eq!(table.reference(ResourceId(1), &descriptor(1), ObjectId(1), L0).unwrap(), 0);
    }

    #[test]
    fn test_freed_slot_reused_and_cleared() {
        let mut table = ResourceTable::new(4, 1);
        table.reference(ResourceId(1), &descriptor(1), ObjectId(0), L0).unwrap();
        table.take_dirty(0);
        table.release(ResourceId(1), ObjectId(0)).unwrap();
        assert_eq!(table.bindings()[0], ResourceBinding::zeroed());
        assert_eq!(table.take_dirty(0), vec![0..1]);

        let slot = table.reference(ResourceId(2), &descriptor(2), ObjectId(1), L0).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(table.bindings()[0].image_view, 2);
    }
}
