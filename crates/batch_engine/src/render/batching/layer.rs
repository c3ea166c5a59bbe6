//! Rendering layers over the shared batch compiler

use super::compiler::LayerBatchCompiler;
use super::draw_command::{DrawCommand, IndirectDraw};
use crate::foundation::ids::LayerId;
use crate::render::slots::ObjectRecordTable;
use crate::scene::{LayerChanges, ModelInfo, SceneView};

/// A rendering layer: one draw pipeline and the objects drawn with it
pub trait Layer {
    /// Layer id, also the row of this layer in every object record
    fn id(&self) -> LayerId;

    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Fold one tick of changes into the layer's command list
    ///
    /// Returns `true` when the list was rebuilt.
    fn compile_batches(
        &mut self,
        changes: &LayerChanges,
        objects: &ObjectRecordTable,
        scene: &dyn SceneView,
    ) -> bool;

    /// The layer's compacted command list
    fn commands(&self) -> &[DrawCommand];

    /// Record where the layer's list starts in the shared buffer
    fn set_base_offset(&mut self, offset: u32);

    /// Start of the layer's list in the shared buffer
    fn base_offset(&self) -> u32;

    /// Append the multi-draw calls this layer issues
    fn bind_for_draw(&self, draws: &mut Vec<IndirectDraw>);
}

/// Draws every member with its own model
#[derive(Debug, Clone)]
pub struct MeshLayer {
    name: String,
    compiler: LayerBatchCompiler,
}

impl MeshLayer {
    /// Create a mesh layer
    pub fn new(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compiler: LayerBatchCompiler::new(id),
        }
    }

    /// Underlying compiler state
    pub fn compiler(&self) -> &LayerBatchCompiler {
        &self.compiler
    }
}

impl Layer for MeshLayer {
    fn id(&self) -> LayerId {
        self.compiler.layer()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn compile_batches(
        &mut self,
        changes: &LayerChanges,
        objects: &ObjectRecordTable,
        scene: &dyn SceneView,
    ) -> bool {
        self.compiler
            .compile(changes, objects, |object| scene.object(object).and_then(|d| d.model))
    }

    fn commands(&self) -> &[DrawCommand] {
        self.compiler.commands()
    }

    fn set_base_offset(&mut self, offset: u32) {
        self.compiler.set_base_offset(offset);
    }

    fn base_offset(&self) -> u32 {
        self.compiler.base_offset()
    }

    fn bind_for_draw(&self, draws: &mut Vec<IndirectDraw>) {
        self.compiler.emit_draws(draws);
    }
}

/// Debug overlay drawing one shared bounds model around each modeled member
#[derive(Debug, Clone)]
pub struct BoundsLayer {
    name: String,
    bounds: ModelInfo,
    compiler: LayerBatchCompiler,
}

impl BoundsLayer {
    /// Create a bounds layer drawing `bounds` for every member
    pub fn new(id: LayerId, name: impl Into<String>, bounds: ModelInfo) -> Self {
        Self {
            name: name.into(),
            bounds,
            compiler: LayerBatchCompiler::new(id),
        }
    }

    /// The shared bounds model
    pub fn bounds_model(&self) -> ModelInfo {
        self.bounds
    }
}

impl Layer for BoundsLayer {
    fn id(&self) -> LayerId {
        self.compiler.layer()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn compile_batches(
        &mut self,
        changes: &LayerChanges,
        objects: &ObjectRecordTable,
        scene: &dyn SceneView,
    ) -> bool {
        let bounds = self.bounds;
        self.compiler.compile(changes, objects, |object| {
            scene
                .object(object)
                .and_then(|d| d.model)
                .map(|_| bounds)
        })
    }

    fn commands(&self) -> &[DrawCommand] {
        self.compiler.commands()
    }

    fn set_base_offset(&mut self, offset: u32) {
        self.compiler.set_base_offset(offset);
    }

    fn base_offset(&self) -> u32 {
        self.compiler.base_offset()
    }

    fn bind_for_draw(&self, draws: &mut Vec<IndirectDraw>) {
        self.compiler.emit_draws(draws);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::ids::{IdIssuer, ModelId};
    use crate::render::slots::ResourceTable;
    use crate::scene::MemoryScene;
    use nalgebra::Matrix4;

    #[test]
    fn test_bounds_layer_draws_shared_model() {
        let mut ids = IdIssuer::new();
        let mut scene = MemoryScene::new();
        let mut resources = ResourceTable::new(4, 1);
        let mut objects = ObjectRecordTable::new(16, 1);

        let bounds = ModelInfo { id: ids.model(), index_count: 24 };
        let mut layer = BoundsLayer::new(ids.layer(), "bounds", bounds);

        let (cube, sphere) = (ids.model(), ids.model());
        let a = scene.spawn(&mut ids, Matrix4::identity());
        let b = scene.spawn(&mut ids, Matrix4::identity());
        let light = scene.spawn(&mut ids, Matrix4::identity());
        scene.set_model(a, Some(ModelInfo { id: cube, index_count: 36 }));
        scene.set_model(b, Some(ModelInfo { id: sphere, index_count: 960 }));
        for id in [a, b, light] {
            scene.attach(id, layer.id());
        }

        let changes = scene.take_changes();
        let layer_changes = changes.layer(layer.id()).unwrap();
        for &id in &layer_changes.updated {
            let descriptor = scene.object(id).unwrap();
            objects.upsert(id, layer.id(), &descriptor, &mut resources).unwrap();
        }
        assert!(layer.compile_batches(layer_changes, &objects, &scene));

        assert_eq!(layer.commands().len(), 2);
        assert!(layer.commands().iter().all(|c| c.index_count == 24));
        let mut draws = Vec::new();
        layer.bind_for_draw(&mut draws);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].model, bounds.id);
        assert_eq!(draws[0].draw_count, 2);
    }

    #[test]
    fn test_mesh_layer_uses_object_models() {
        let mut ids = IdIssuer::new();
        let mut scene = MemoryScene::new();
        let mut resources = ResourceTable::new(4, 1);
        let mut objects = ObjectRecordTable::new(16, 1);
        let mut layer = MeshLayer::new(ids.layer(), "opaque");

        let a = scene.spawn(&mut ids, Matrix4::identity());
        scene.set_model(a, Some(ModelInfo { id: ModelId(5), index_count: 12 }));
        scene.attach(a, layer.id());

        let changes = scene.take_changes();
        let layer_changes = changes.layer(layer.id()).unwrap();
        objects
            .upsert(a, layer.id(), &scene.object(a).unwrap(), &mut resources)
            .unwrap();
        layer.compile_batches(layer_changes, &objects, &scene);
        layer.set_base_offset(4);

        let mut draws = Vec::new();
        layer.bind_for_draw(&mut draws);
        assert_eq!(draws, vec![IndirectDraw { layer: layer.id(), model: ModelId(5), first_command: 4, draw_count: 1 }]);
        assert_eq!(layer.name(), "opaque");
        assert_eq!(layer.compiler().instance_count(), 1);
    }
}
