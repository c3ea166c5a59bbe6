use nalgebra::{Matrix4, Vector3};

use super::tick;
use crate::config::RendererConfig;
use crate::foundation::ids::{IdIssuer, LayerId, ObjectId};
use crate::render::batching::{BoundsLayer, DrawCommand, MeshLayer};
use crate::render::frame::{DeviceError, DeviceEvent, FrameGlobals, SimulatedDevice, UploadTarget};
use crate::render::slots::{ObjectRecord, SlotError};
use crate::render::{RenderError, Renderer};
use crate::scene::{MemoryScene, ModelInfo, ResourceDescriptor, ResourceRequest};

struct World {
    ids: IdIssuer,
    scene: MemoryScene,
    renderer: Renderer<SimulatedDevice>,
    opaque: LayerId,
    bounds: LayerId,
    cube: ModelInfo,
    sphere: ModelInfo,
}

impl World {
    fn new(config: RendererConfig) -> Self {
        let mut ids = IdIssuer::new();
        let mut renderer = Renderer::new(config, SimulatedDevice::new(3)).unwrap();
        let opaque = ids.layer();
        let bounds = ids.layer();
        let cube = ModelInfo { id: ids.model(), index_count: 36 };
        let sphere = ModelInfo { id: ids.model(), index_count: 960 };
        let box_model = ModelInfo { id: ids.model(), index_count: 24 };

        renderer
            .add_layer(Box::new(MeshLayer::new(opaque, "opaque")))
            .unwrap();
        renderer
            .add_layer(Box::new(BoundsLayer::new(bounds, "bounds", box_model)))
            .unwrap();

        Self {
            ids,
            scene: MemoryScene::new(),
            renderer,
            opaque,
            bounds,
            cube,
            sphere,
        }
    }

    fn spawn(&mut self, model: ModelInfo, layers: &[LayerId]) -> ObjectId {
        let id = self.scene.spawn(&mut self.ids, Matrix4::identity());
        self.scene.set_model(id, Some(model));
        for &layer in layers {
            self.scene.attach(id, layer);
        }
        id
    }

    fn tick(&mut self) {
        tick(&mut self.renderer, &mut self.scene).unwrap();
    }

    fn instances(&self, layer: LayerId) -> u32 {
        self.renderer
            .layer(layer)
            .unwrap()
            .commands()
            .iter()
            .map(|c| c.instance_count)
            .sum()
    }
}

fn small_config() -> RendererConfig {
    RendererConfig::new()
        .with_max_objects(32)
        .with_max_resources(4)
        .with_max_draw_commands(64)
        .with_frames_in_flight(2)
}

#[test]
fn test_layers_share_one_draw_buffer() {
    let mut world = World::new(small_config());
    let (opaque, bounds) = (world.opaque, world.bounds);
    let (cube, sphere) = (world.cube, world.sphere);
    world.spawn(cube, &[opaque, bounds]);
    world.spawn(cube, &[opaque]);
    world.spawn(sphere, &[opaque, bounds]);
    world.tick();

    assert_eq!(world.instances(opaque), 3);
    assert_eq!(world.instances(bounds), 2);
    assert_eq!(world.renderer.draw_commands().len(), 5);

    let draws = world.renderer.indirect_draws();
    // opaque: cube x2, sphere x1; bounds: box x2
    assert_eq!(draws.len(), 3);
    assert_eq!((draws[0].model, draws[0].first_command, draws[0].draw_count), (cube.id, 0, 2));
    assert_eq!((draws[1].model, draws[1].first_command, draws[1].draw_count), (sphere.id, 2, 1));
    assert_eq!((draws[2].layer, draws[2].first_command, draws[2].draw_count), (bounds, 3, 2));
    assert_eq!(world.renderer.layer(bounds).unwrap().base_offset(), 3);

    let uploaded = world.renderer.device().buffer(0, UploadTarget::DrawCommands);
    assert_eq!(uploaded, bytemuck::cast_slice::<DrawCommand, u8>(world.renderer.draw_commands()));
}

#[test]
fn test_records_uploaded_to_each_frame_copy() {
    let mut world = World::new(small_config());
    let (opaque, cube) = (world.opaque, world.cube);
    let id = world.spawn(cube, &[opaque]);
    world
        .scene
        .set_transform(id, Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0)));
    world.tick();
    world.tick();

    let slot = world.renderer.objects().slot_of(id).unwrap() as usize;
    let record = *world.renderer.objects().record(id).unwrap();
    let size = std::mem::size_of::<ObjectRecord>();
    for frame in 0..2 {
        let buffer = world.renderer.device().buffer(frame, UploadTarget::ObjectRecords);
        assert_eq!(&buffer[slot * size..(slot + 1) * size], bytemuck::bytes_of(&record));
    }
    assert_eq!(record.model[3][0], 5.0);
}

#[test]
fn test_quiet_ticks_upload_only_globals() {
    let mut world = World::new(small_config());
    let (opaque, cube) = (world.opaque, world.cube);
    world.spawn(cube, &[opaque]);
    // One tick per frame copy brings both up to date
    world.tick();
    world.tick();
    world.renderer.device_mut().clear_events();

    let before = world.renderer.draw_commands().to_vec();
    world.tick();
    world.tick();
    assert_eq!(world.renderer.draw_commands(), before.as_slice());

    let uploads: Vec<UploadTarget> = world
        .renderer
        .device()
        .events()
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::Upload { target, .. } => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(uploads, vec![UploadTarget::FrameGlobals, UploadTarget::FrameGlobals]);
}

#[test]
fn test_uploads_follow_the_frame_fence_wait() {
    let mut world = World::new(small_config());
    let (opaque, cube) = (world.opaque, world.cube);
    for _ in 0..6 {
        world.spawn(cube, &[opaque]);
        world.tick();
    }

    let fences = [
        world.renderer.pipeline().frame_fence(0).unwrap(),
        world.renderer.pipeline().frame_fence(1).unwrap(),
    ];
    let events = world.renderer.device().events();
    for (index, event) in events.iter().enumerate() {
        if let DeviceEvent::Upload { frame, .. } = event {
            let last_wait = events[..index]
                .iter()
                .rposition(|e| *e == DeviceEvent::WaitFence(fences[*frame]));
            let last_submit = events[..index].iter().rposition(|e| {
                matches!(e, DeviceEvent::SubmitGraphics { frame: f, .. } if f == frame)
            });
            assert!(last_wait.is_some());
            assert!(last_submit.map_or(true, |submit| last_wait > Some(submit)));
        }
    }
}

#[test]
fn test_destroy_and_slot_reuse_through_renderer() {
    let mut world = World::new(small_config());
    let (opaque, bounds, cube) = (world.opaque, world.bounds, world.cube);
    let a = world.spawn(cube, &[opaque, bounds]);
    let b = world.spawn(cube, &[opaque]);
    world.tick();
    let a_slot = world.renderer.objects().slot_of(a).unwrap();

    world.scene.destroy(a);
    let c = world.spawn(cube, &[opaque]);
    world.tick();

    assert!(world.renderer.objects().slot_of(a).is_none());
    assert_eq!(world.renderer.objects().slot_of(c), Some(a_slot));
    assert_eq!(world.instances(opaque), 2);
    assert_eq!(world.instances(bounds), 0);
    assert_eq!(world.renderer.objects().len(), 2);
    assert!(world.renderer.objects().slot_of(b).is_some());
}

#[test]
fn test_detach_keeps_record_for_other_layers() {
    let mut world = World::new(small_config());
    let (opaque, bounds, cube) = (world.opaque, world.bounds, world.cube);
    let a = world.spawn(cube, &[opaque, bounds]);
    world.tick();

    world.scene.detach(a, bounds);
    world.tick();
    assert_eq!(world.renderer.objects().layers_of(a), vec![opaque]);
    assert_eq!(world.instances(bounds), 0);
    assert_eq!(world.instances(opaque), 1);
}

#[test]
fn test_created_and_destroyed_in_one_tick_is_noop() {
    let mut world = World::new(small_config());
    let (opaque, cube) = (world.opaque, world.cube);
    let a = world.spawn(cube, &[opaque]);
    world.scene.destroy(a);
    world.tick();
    assert!(world.renderer.objects().is_empty());
    assert_eq!(world.instances(opaque), 0);
}

#[test]
fn test_object_without_model_gets_record_but_no_draw() {
    let mut world = World::new(small_config());
    let opaque = world.opaque;
    let light = world.scene.spawn(&mut world.ids, Matrix4::identity());
    world.scene.attach(light, opaque);
    world.tick();
    assert!(world.renderer.objects().slot_of(light).is_some());
    assert!(world.renderer.draw_commands().is_empty());
}

#[test]
fn test_resources_resolved_into_records() {
    let mut world = World::new(small_config());
    let (opaque, cube) = (world.opaque, world.cube);
    let texture = world.ids.resource();
    let request = ResourceRequest {
        resource: texture,
        descriptor: ResourceDescriptor::new(0xAB, 0xCD),
    };
    let a = world.spawn(cube, &[opaque]);
    world.scene.bind(a, opaque, 1, request);
    let b = world.spawn(cube, &[opaque]);
    world.scene.bind(b, opaque, 0, request);
    world.tick();

    let slot = world.renderer.resources().slot_of(texture).unwrap();
    let row = opaque.raw() as usize;
    assert_eq!(world.renderer.objects().record(a).unwrap().resources[row][1], slot);
    assert_eq!(world.renderer.objects().record(b).unwrap().resources[row][0], slot);
    assert_eq!(world.renderer.resources().bindings()[slot as usize].image_view, 0xAB);

    world.scene.destroy(a);
    world.tick();
    assert_eq!(world.renderer.resources().slot_of(texture), Some(slot));
    world.scene.unbind(b, opaque, 0);
    world.tick();
    assert!(world.renderer.resources().is_empty());
}

#[test]
fn test_draw_buffer_overflow_reported() {
    let mut world = World::new(small_config().with_max_draw_commands(2));
    let (opaque, cube) = (world.opaque, world.cube);
    for _ in 0..3 {
        world.spawn(cube, &[opaque]);
    }

    let handle = world.renderer.begin_frame().unwrap().unwrap();
    let changes = world.scene.take_changes();
    let result = world
        .renderer
        .record_and_submit(&handle, &world.scene, &changes, &FrameGlobals::default());
    assert!(matches!(
        result,
        Err(RenderError::DrawBufferOverflow { required: 3, capacity: 2 })
    ));
}

#[test]
fn test_object_capacity_exhausted() {
    let mut world = World::new(small_config().with_max_objects(1));
    let (opaque, cube) = (world.opaque, world.cube);
    world.spawn(cube, &[opaque]);
    world.spawn(cube, &[opaque]);

    let handle = world.renderer.begin_frame().unwrap().unwrap();
    let changes = world.scene.take_changes();
    let result = world
        .renderer
        .record_and_submit(&handle, &world.scene, &changes, &FrameGlobals::default());
    assert!(matches!(
        result,
        Err(RenderError::Slot(SlotError::CapacityExhausted { capacity: 1, .. }))
    ));
}

#[test]
fn test_invalid_layers_rejected() {
    let mut world = World::new(small_config());
    let duplicate = world.renderer.add_layer(Box::new(MeshLayer::new(world.opaque, "again")));
    assert!(matches!(duplicate, Err(RenderError::InvalidLayer { .. })));
    let out_of_range = world
        .renderer
        .add_layer(Box::new(MeshLayer::new(LayerId(crate::config::MAX_LAYERS as u32), "far")));
    assert!(matches!(out_of_range, Err(RenderError::InvalidLayer { .. })));
}

#[test]
fn test_changes_for_unregistered_layers_ignored() {
    let mut world = World::new(small_config());
    let cube = world.cube;
    world.spawn(cube, &[LayerId(5)]);
    world.tick();
    assert!(world.renderer.objects().is_empty());
}

#[test]
fn test_invalid_config_rejected() {
    let result = Renderer::new(RendererConfig::new().with_frames_in_flight(0), SimulatedDevice::new(2));
    assert!(matches!(result, Err(RenderError::Config(_))));
}

#[test]
fn test_shutdown_releases_device_objects() {
    let mut world = World::new(small_config());
    let (opaque, cube) = (world.opaque, world.cube);
    world.spawn(cube, &[opaque]);
    world.tick();
    world.tick();

    let stats = world.renderer.stats();
    assert_eq!(stats.frames.frames_presented, 2);
    assert_eq!(stats.live_objects, 1);
    assert_eq!(stats.indirect_draws, 1);

    let device = world.renderer.shutdown().unwrap();
    assert_eq!(device.live_objects(), 0);
    assert_eq!(device.pending_submissions(), 0);
    assert_eq!(device.events().last(), Some(&DeviceEvent::WaitIdle));
}

#[test]
fn test_skipped_tick_keeps_changes() {
    let mut world = World::new(small_config());
    let (opaque, cube) = (world.opaque, world.cube);
    world
        .renderer
        .device_mut()
        .inject_acquire_failure(DeviceError::TargetInvalidated);
    world.spawn(cube, &[opaque]);

    assert!(tick(&mut world.renderer, &mut world.scene).is_none());
    assert!(world.scene.has_changes());
    world.tick();
    assert_eq!(world.instances(opaque), 1);
    assert_eq!(world.renderer.stats().frames.rebuilds, 1);
}
