//! Headless batch-engine demo
//!
//! Drives the renderer against the simulated device: a small asteroid field
//! is spawned, drifted, re-textured and culled over a fixed number of ticks,
//! with per-tick statistics logged along the way.
//!
//! Usage: `headless_demo [config.toml|config.ron] [ticks]`

use std::time::Instant;

use batch_engine::foundation::logging;
use batch_engine::prelude::*;
use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, Vector3};
use thiserror::Error;

const DEFAULT_TICKS: u32 = 120;
const FIELD_SIZE: u32 = 48;
const SWAPCHAIN_IMAGES: u32 = 3;

#[derive(Error, Debug)]
enum DemoError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("invalid tick count '{0}'")]
    TickCount(String),
}

/// Models and textures shared by the field
struct Assets {
    rock: ModelInfo,
    crystal: ModelInfo,
    hull_box: ModelInfo,
    dust: ResourceRequest,
    ice: ResourceRequest,
}

impl Assets {
    fn new(ids: &mut IdIssuer) -> Self {
        Self {
            rock: ModelInfo { id: ids.model(), index_count: 1_440 },
            crystal: ModelInfo { id: ids.model(), index_count: 240 },
            hull_box: ModelInfo { id: ids.model(), index_count: 24 },
            dust: ResourceRequest {
                resource: ids.resource(),
                descriptor: ResourceDescriptor::new(0x1000, 0x2000),
            },
            ice: ResourceRequest {
                resource: ids.resource(),
                descriptor: ResourceDescriptor::new(0x1001, 0x2000),
            },
        }
    }
}

struct HeadlessDemo {
    ids: IdIssuer,
    scene: MemoryScene,
    renderer: Renderer<SimulatedDevice>,
    assets: Assets,
    opaque: LayerId,
    bounds: LayerId,
    field: Vec<ObjectId>,
    tick: u32,
    start_time: Instant,
}

impl HeadlessDemo {
    fn new(config: RendererConfig) -> Result<Self, DemoError> {
        let mut ids = IdIssuer::new();
        let assets = Assets::new(&mut ids);
        let mut renderer = Renderer::new(config, SimulatedDevice::new(SWAPCHAIN_IMAGES))?;

        let opaque = ids.layer();
        let bounds = ids.layer();
        renderer.add_layer(Box::new(MeshLayer::new(opaque, "opaque")))?;
        renderer.add_layer(Box::new(BoundsLayer::new(bounds, "bounds", assets.hull_box)))?;

        Ok(Self {
            ids,
            scene: MemoryScene::new(),
            renderer,
            assets,
            opaque,
            bounds,
            field: Vec::new(),
            tick: 0,
            start_time: Instant::now(),
        })
    }

    fn spawn_field(&mut self) {
        for index in 0..FIELD_SIZE {
            let position = Vector3::new((index % 8) as f32 * 4.0, 0.0, (index / 8) as f32 * 4.0);
            let id = self.scene.spawn(&mut self.ids, Matrix4::new_translation(&position));
            let (model, texture) = if index % 5 == 0 {
                (self.assets.crystal, self.assets.ice)
            } else {
                (self.assets.rock, self.assets.dust)
            };
            self.scene.set_model(id, Some(model));
            self.scene.bind(id, self.opaque, 0, texture);
            self.scene.attach(id, self.opaque);
            if index % 3 == 0 {
                self.scene.attach(id, self.bounds);
            }
            self.field.push(id);
        }
        log::info!("Spawned {} objects", self.field.len());
    }

    /// Mutate the scene the way a game tick would
    fn simulate(&mut self) {
        let t = self.tick as f32 * 0.05;
        for (index, &id) in self.field.iter().enumerate().step_by(4) {
            let drift = Vector3::new(t.sin(), (t + index as f32).cos() * 0.5, 0.0);
            let base = Vector3::new((index % 8) as f32 * 4.0, 0.0, (index / 8) as f32 * 4.0);
            self.scene
                .set_transform(id, Matrix4::new_translation(&(base + drift)));
        }

        if self.tick % 30 == 15 {
            if let Some(&id) = self.field.get(self.tick as usize % self.field.len().max(1)) {
                log::debug!("Re-texturing {}", id);
                self.scene.bind(id, self.opaque, 0, self.assets.ice);
            }
        }

        if self.tick % 20 == 10 {
            if let Some(id) = self.field.pop() {
                log::debug!("Destroying {}", id);
                self.scene.destroy(id);
            }
        }
    }

    fn globals(&self) -> FrameGlobals {
        let eye = Point3::new(14.0, 18.0, -12.0);
        let view = Isometry3::look_at_rh(&eye, &Point3::new(14.0, 0.0, 12.0), &Vector3::y()).to_homogeneous();
        let projection = Perspective3::new(16.0 / 9.0, 45f32.to_radians(), 0.1, 200.0).to_homogeneous();
        FrameGlobals::new(&view, &projection, &eye, self.start_time.elapsed().as_secs_f32())
    }

    fn run(&mut self, ticks: u32) -> Result<(), DemoError> {
        self.spawn_field();

        while self.tick < ticks {
            self.simulate();
            self.tick += 1;

            let Some(frame) = self.renderer.begin_frame()? else {
                log::info!("Tick {} skipped while the target was rebuilt", self.tick);
                continue;
            };
            let changes = self.scene.take_changes();
            let globals = self.globals();
            self.renderer
                .record_and_submit(&frame, &self.scene, &changes, &globals)?;
            self.renderer.end_frame(&frame)?;

            // Let the simulated GPU make partial progress each tick
            self.renderer.device_mut().complete(1);

            if self.tick % 30 == 0 {
                self.renderer
                    .device_mut()
                    .inject_present_result(Ok(PresentStatus::Suboptimal));
            }

            let stats = self.renderer.stats();
            log::debug!(
                "Tick {}: {} objects, {} resources, {} commands in {} draws",
                self.tick,
                stats.live_objects,
                stats.live_resources,
                stats.draw_commands,
                stats.indirect_draws
            );
        }
        Ok(())
    }

    fn shutdown(self) -> Result<(), DemoError> {
        let stats = self.renderer.stats();
        log::info!(
            "Presented {} frames ({} rebuilds, {} skipped, {} image fence waits)",
            stats.frames.frames_presented,
            stats.frames.rebuilds,
            stats.frames.skipped_frames,
            stats.frames.image_fence_waits
        );
        let device = self.renderer.shutdown()?;
        log::info!("Device objects still alive: {}", device.live_objects());
        Ok(())
    }
}

fn load_config(path: Option<&str>) -> Result<RendererConfig, DemoError> {
    match path {
        Some(path) => Ok(RendererConfig::load_from_file(path)?),
        None => Ok(RendererConfig::default()),
    }
}

fn run() -> Result<(), DemoError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first().map(String::as_str))?;
    logging::init_with_level(&config.log_level);
    if let Some(path) = args.first() {
        log::info!("Loaded renderer config from {}", path);
    }

    let ticks = match args.get(1) {
        Some(raw) => raw.parse().map_err(|_| DemoError::TickCount(raw.clone()))?,
        None => DEFAULT_TICKS,
    };

    log::info!("Starting headless batch demo for {} ticks", ticks);
    let mut demo = HeadlessDemo::new(config)?;
    demo.run(ticks)?;
    demo.shutdown()
}

fn main() {
    if let Err(e) = run() {
        log::error!("Demo failed: {}", e);
        eprintln!("headless_demo: {e}");
        std::process::exit(1);
    }
}
