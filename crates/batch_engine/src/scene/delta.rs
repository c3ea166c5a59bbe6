//! Per-tick change collection
//!
//! Raw notifications arrive in any order while the scene updates. They are
//! folded per (layer, object) into [`ChangeFlags`] and handed to the renderer as
//! one sorted [`TickChanges`] batch.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::foundation::ids::{LayerId, ObjectId};

bitflags! {
    /// Pending changes of one object within one layer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeFlags: u8 {
        /// Joined the layer this tick
        const CREATED = 0b001;
        /// State changed this tick
        const UPDATED = 0b010;
        /// Left the layer this tick
        const DESTROYED = 0b100;
    }
}

/// Coalesced changes of one layer
///
/// Every list is sorted and free of duplicates. Created ids also appear in
/// `updated`. Ids in `destroyed` appear in neither other list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerChanges {
    /// Objects that joined the layer
    pub created: Vec<ObjectId>,
    /// Objects whose record must be rewritten
    pub updated: Vec<ObjectId>,
    /// Objects that left the layer
    pub destroyed: Vec<ObjectId>,
}

impl LayerChanges {
    /// No changes at all
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.destroyed.is_empty()
    }
}

/// Changes of one tick, per layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickChanges {
    layers: BTreeMap<LayerId, LayerChanges>,
}

impl TickChanges {
    /// Changes for `layer`, if any were recorded
    pub fn layer(&self, layer: LayerId) -> Option<&LayerChanges> {
        self.layers.get(&layer)
    }

    /// Iterate layers in id order
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &LayerChanges)> {
        self.layers.iter().map(|(&id, changes)| (id, changes))
    }

    /// Nothing changed in any layer
    pub fn is_empty(&self) -> bool {
        self.layers.values().all(LayerChanges::is_empty)
    }

    /// Replace the changes of one layer
    pub fn insert(&mut self, layer: LayerId, changes: LayerChanges) {
        self.layers.insert(layer, changes);
    }
}

/// Accumulates raw change notifications during a tick
#[derive(Debug, Clone, Default)]
pub struct SceneDelta {
    pending: BTreeMap<LayerId, BTreeMap<ObjectId, ChangeFlags>>,
}

impl SceneDelta {
    /// Empty delta
    pub fn new() -> Self {
        Self::default()
    }

    /// `object` joined `layer`
    pub fn created(&mut self, object: ObjectId, layer: LayerId) {
        let flags = self.flags_mut(object, layer);
        flags.remove(ChangeFlags::DESTROYED);
        flags.insert(ChangeFlags::CREATED | ChangeFlags::UPDATED);
    }

    /// `object` changed while in `layer`
    pub fn updated(&mut self, object: ObjectId, layer: LayerId) {
        let flags = self.flags_mut(object, layer);
        if flags.contains(ChangeFlags::DESTROYED) {
            log::trace!("Ignoring update of {} after it left {}", object, layer);
            return;
        }
        flags.insert(ChangeFlags::UPDATED);
    }

    /// `object` left `layer`, or was destroyed
    pub fn destroyed(&mut self, object: ObjectId, layer: LayerId) {
        *self.flags_mut(object, layer) = ChangeFlags::DESTROYED;
    }

    /// No notifications since the last [`take`](Self::take)
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Coalesce and clear the pending notifications
    pub fn take(&mut self) -> TickChanges {
        let mut changes = TickChanges::default();

        for (layer, objects) in std::mem::take(&mut self.pending) {
            let mut layer_changes = LayerChanges::default();
            for (object, flags) in objects {
                if flags.contains(ChangeFlags::DESTROYED) {
                    layer_changes.destroyed.push(object);
                    continue;
                }
                if flags.contains(ChangeFlags::CREATED) {
                    layer_changes.created.push(object);
                }
                if flags.intersects(ChangeFlags::CREATED | ChangeFlags::UPDATED) {
                    layer_changes.updated.push(object);
                }
            }
            changes.insert(layer, layer_changes);
        }

        changes
    }

    fn flags_mut(&mut self, object: ObjectId, layer: LayerId) -> &mut ChangeFlags {
        self.pending
            .entry(layer)
            .or_default()
            .entry(object)
            .or_default()
    }
}
