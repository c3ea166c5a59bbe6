//! In-memory scene
//!
//! A small object store that records its own change notifications. The demo
//! binary and the scenario tests drive the renderer with it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use nalgebra::Matrix4;

use super::delta::{SceneDelta, TickChanges};
use super::view::{LayerResources, ModelInfo, ObjectDescriptor, ResourceRequest, SceneView};
use crate::config::MAX_LAYER_RESOURCES;
use crate::foundation::ids::{IdIssuer, LayerId, ObjectId};

#[derive(Debug, Clone)]
struct SceneObject {
    transform: Matrix4<f32>,
    model: Option<ModelInfo>,
    bindings: BTreeMap<LayerId, LayerResources>,
    layers: BTreeSet<LayerId>,
}

/// HashMap-backed scene producing [`TickChanges`]
#[derive(Debug, Default)]
pub struct MemoryScene {
    objects: HashMap<ObjectId, SceneObject>,
    delta: SceneDelta,
}

impl MemoryScene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object that belongs to no layer yet
    pub fn spawn(&mut self, ids: &mut IdIssuer, transform: Matrix4<f32>) -> ObjectId {
        let id = ids.object();
        self.objects.insert(
            id,
            SceneObject {
                transform,
                model: None,
                bindings: BTreeMap::new(),
                layers: BTreeSet::new(),
            },
        );
        id
    }

    /// Move an object
    pub fn set_transform(&mut self, id: ObjectId, transform: Matrix4<f32>) -> bool {
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        object.transform = transform;
        for &layer in &object.layers {
            self.delta.updated(id, layer);
        }
        true
    }

    /// Change or clear the model of an object
    pub fn set_model(&mut self, id: ObjectId, model: Option<ModelInfo>) -> bool {
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        object.model = model;
        for &layer in &object.layers {
            self.delta.updated(id, layer);
        }
        true
    }

    /// Bind a resource at `index` of the object's row for `layer`
    pub fn bind(&mut self, id: ObjectId, layer: LayerId, index: usize, request: ResourceRequest) -> bool {
        self.set_binding(id, layer, index, Some(request))
    }

    /// Clear the resource at `index` of the object's row for `layer`
    pub fn unbind(&mut self, id: ObjectId, layer: LayerId, index: usize) -> bool {
        self.set_binding(id, layer, index, None)
    }

    /// Add an object to a layer
    pub fn attach(&mut self, id: ObjectId, layer: LayerId) -> bool {
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        if object.layers.insert(layer) {
            self.delta.created(id, layer);
        }
        true
    }

    /// Remove an object from a layer
    pub fn detach(&mut self, id: ObjectId, layer: LayerId) -> bool {
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        if object.layers.remove(&layer) {
            self.delta.destroyed(id, layer);
        }
        true
    }

    /// Remove an object from the scene and every layer it was in
    pub fn destroy(&mut self, id: ObjectId) -> bool {
        let Some(object) = self.objects.remove(&id) else {
            return false;
        };
        for layer in object.layers {
            self.delta.destroyed(id, layer);
        }
        true
    }

    /// Layers `id` currently belongs to
    pub fn layers_of(&self, id: ObjectId) -> Vec<LayerId> {
        self.objects
            .get(&id)
            .map(|object| object.layers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// No live objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether changes are waiting to be taken
    pub fn has_changes(&self) -> bool {
        !self.delta.is_empty()
    }

    /// Coalesce and clear the changes recorded since the last call
    pub fn take_changes(&mut self) -> TickChanges {
        self.delta.take()
    }

    fn set_binding(&mut self, id: ObjectId, layer: LayerId, index: usize, request: Option<ResourceRequest>) -> bool {
        if index >= MAX_LAYER_RESOURCES {
            log::warn!("{} binding index {} exceeds {} per layer", id, index, MAX_LAYER_RESOURCES);
            return false;
        }
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        object.bindings.entry(layer).or_insert([None; MAX_LAYER_RESOURCES])[index] = request;
        if object.layers.contains(&layer) {
            self.delta.updated(id, layer);
        }
        true
    }
}

impl SceneView for MemoryScene {
    fn object(&self, id: ObjectId) -> Option<ObjectDescriptor> {
        self.objects.get(&id).map(|object| ObjectDescriptor {
            transform: object.transform,
            model: object.model,
            bindings: object.bindings.clone(),
        })
    }
}
