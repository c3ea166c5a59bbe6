use std::collections::BTreeMap;

use nalgebra::Matrix4;

use crate::config::MAX_LAYER_RESOURCES;
use crate::foundation::ids::{LayerId, ModelId, ObjectId, ResourceId};

/// Texel filtering used when sampling a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum FilterMode {
    /// Nearest texel
    Nearest = 0,
    /// Bilinear
    #[default]
    Linear = 1,
}

/// Behaviour for coordinates outside `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum AddressMode {
    /// Tile the image
    #[default]
    Repeat = 0,
    /// Tile with every other copy mirrored
    MirroredRepeat = 1,
    /// Clamp to the border texel
    ClampToEdge = 2,
}

/// Device handles and sampling parameters of one resource
///
/// Handles are opaque to the renderer; they are copied verbatim into the
/// device-visible binding table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceDescriptor {
    /// Raw image view handle
    pub image_view: u64,
    /// Raw sampler handle
    pub sampler: u64,
    /// Filtering mode
    pub filter: FilterMode,
    /// Addressing mode
    pub address_mode: AddressMode,
    /// Maximum anisotropy, 1.0 disables it
    pub anisotropy: f32,
    /// Number of mip levels in the image
    pub mip_levels: u32,
}

impl ResourceDescriptor {
    /// Descriptor with default sampling for the given handles
    pub fn new(image_view: u64, sampler: u64) -> Self {
        Self {
            image_view,
            sampler,
            filter: FilterMode::default(),
            address_mode: AddressMode::default(),
            anisotropy: 1.0,
            mip_levels: 1,
        }
    }
}

/// A resource an object wants bound at one position of one layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceRequest {
    /// Stable identity of the resource
    pub resource: ResourceId,
    /// Binding data written when the resource first gets a slot
    pub descriptor: ResourceDescriptor,
}

/// Model metadata needed to emit a draw command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelInfo {
    /// Stable identity of the model
    pub id: ModelId,
    /// Indices drawn per instance
    pub index_count: u32,
}

/// Resource positions of one layer row
pub type LayerResources = [Option<ResourceRequest>; MAX_LAYER_RESOURCES];

/// Current render-relevant state of one scene object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDescriptor {
    /// World transform
    pub transform: Matrix4<f32>,
    /// Model drawn for this object, `None` for objects without geometry
    pub model: Option<ModelInfo>,
    /// Resource requests keyed by layer
    pub bindings: BTreeMap<LayerId, LayerResources>,
}

impl ObjectDescriptor {
    /// Descriptor with no model and no bindings
    pub fn new(transform: Matrix4<f32>) -> Self {
        Self {
            transform,
            model: None,
            bindings: BTreeMap::new(),
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: ModelInfo) -> Self {
        self.model = Some(model);
        self
    }

    /// Request `request` at position `index` of `layer`
    pub fn with_resource(mut self, layer: LayerId, index: usize, request: ResourceRequest) -> Self {
        if index < MAX_LAYER_RESOURCES {
            self.bindings.entry(layer).or_insert([None; MAX_LAYER_RESOURCES])[index] = Some(request);
        }
        self
    }

    /// Requests for `layer`, all empty when the layer has none
    pub fn resources_for(&self, layer: LayerId) -> LayerResources {
        self.bindings
            .get(&layer)
            .copied()
            .unwrap_or([None; MAX_LAYER_RESOURCES])
    }
}

/// Read access to scene objects
pub trait SceneView {
    /// Current state of `id`, `None` if it no longer exists
    fn object(&self, id: ObjectId) -> Option<ObjectDescriptor>;
}
