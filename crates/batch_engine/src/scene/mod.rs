//! Scene-side interface consumed by the renderer
//!
//! The renderer never owns scene objects. Each tick it receives the set of
//! objects that changed per layer ([`TickChanges`]) and reads their current
//! state through [`SceneView`].

mod delta;
mod memory;
mod view;

pub use delta::{ChangeFlags, LayerChanges, SceneDelta, TickChanges};
pub use memory::MemoryScene;
pub use view::{
    AddressMode, FilterMode, LayerResources, ModelInfo, ObjectDescriptor, ResourceDescriptor,
    ResourceRequest, SceneView,
};
