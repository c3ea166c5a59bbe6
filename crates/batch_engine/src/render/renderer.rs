//! # Renderer
//!
//! Composition root of the batch engine. Owns the shared device tables, the
//! layer set and the frame pipeline, and runs the per-tick passes in order:
//!
//! ```text
//! begin_frame ──► record_and_submit ──────────────────────────────► end_frame
//!   fence wait      1. record pass   destroyed, then updated objects   present
//!   acquire         2. batch pass    per-layer compaction
//!                   3. upload pass   dirty records, bindings, draws
//!                   4. compute + graphics submission
//! ```

use thiserror::Error;

use super::batching::{DrawCommand, IndirectDraw, Layer};
use super::frame::{
    DeviceError, FrameDevice, FrameError, FrameGlobals, FrameHandle, FramePipeline, FrameStats, UploadTarget,
};
use super::slots::{ObjectRecord, ObjectRecordTable, ResourceBinding, ResourceTable, SlotError};
use crate::config::{ConfigError, RendererConfig, MAX_LAYERS};
use crate::foundation::ids::LayerId;
use crate::scene::{SceneView, TickChanges};

/// Errors surfaced to the frame-loop driver
#[derive(Error, Debug)]
pub enum RenderError {
    /// A slot table ran out or was misused
    #[error(transparent)]
    Slot(#[from] SlotError),

    /// The frame pipeline failed
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A device call made by the renderer failed
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The configuration is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The compacted draw commands do not fit the shared buffer
    #[error("draw-command buffer overflow: {required} commands, capacity {capacity}")]
    DrawBufferOverflow {
        /// Commands produced this tick
        required: u32,
        /// Configured buffer capacity
        capacity: u32,
    },

    /// A layer id does not fit the record rows or is already registered
    #[error("cannot register {layer}: {reason}")]
    InvalidLayer {
        /// Offending layer
        layer: LayerId,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Snapshot of renderer state for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererStats {
    /// Frame pipeline counters
    pub frames: FrameStats,
    /// Objects holding a record slot
    pub live_objects: usize,
    /// Resources holding a binding slot
    pub live_resources: usize,
    /// Commands in the shared draw buffer
    pub draw_commands: usize,
    /// Multi-draw calls issued per frame
    pub indirect_draws: usize,
}

/// Batch renderer over a [`FrameDevice`]
pub struct Renderer<D: FrameDevice> {
    config: RendererConfig,
    device: D,
    resources: ResourceTable,
    objects: ObjectRecordTable,
    layers: Vec<Box<dyn Layer>>,
    commands: Vec<DrawCommand>,
    draws: Vec<IndirectDraw>,
    draw_version: u64,
    uploaded_draw_version: Vec<Option<u64>>,
    pipeline: FramePipeline<D>,
}

impl<D: FrameDevice> Renderer<D> {
    /// Validate `config` and build the tables and frame pipeline on `device`
    pub fn new(config: RendererConfig, mut device: D) -> RenderResult<Self> {
        config.validate()?;

        let frames = config.frames_in_flight;
        let pipeline = FramePipeline::new(&mut device, frames, config.fence_timeout_ns)?;
        log::info!(
            "Renderer ready: {} objects, {} resources, {} draw commands",
            config.max_objects,
            config.max_resources,
            config.max_draw_commands
        );

        Ok(Self {
            resources: ResourceTable::new(config.max_resources, frames),
            objects: ObjectRecordTable::new(config.max_objects, frames),
            layers: Vec::new(),
            commands: Vec::new(),
            draws: Vec::new(),
            draw_version: 0,
            uploaded_draw_version: vec![None; frames],
            pipeline,
            device,
            config,
        })
    }

    /// Register a layer; its id selects its row in every object record
    pub fn add_layer(&mut self, layer: Box<dyn Layer>) -> RenderResult<()> {
        let id = layer.id();
        if id.raw() as usize >= MAX_LAYERS {
            return Err(RenderError::InvalidLayer {
                layer: id,
                reason: "id exceeds the record layer rows",
            });
        }
        if self.layers.iter().any(|existing| existing.id() == id) {
            return Err(RenderError::InvalidLayer {
                layer: id,
                reason: "already registered",
            });
        }
        log::info!("Registered {} ({})", id, layer.name());
        self.layers.push(layer);
        Ok(())
    }

    /// Start a frame, `None` if the tick must be skipped
    pub fn begin_frame(&mut self) -> RenderResult<Option<FrameHandle>> {
        Ok(self.pipeline.begin_frame(&mut self.device)?)
    }

    /// Apply one tick of scene changes and submit the frame's device work
    pub fn record_and_submit(
        &mut self,
        handle: &FrameHandle,
        scene: &dyn SceneView,
        changes: &TickChanges,
        globals: &FrameGlobals,
    ) -> RenderResult<()> {
        self.update_records(scene, changes)?;
        self.compile_layers(scene, changes)?;
        self.upload(handle.frame, globals)?;

        self.pipeline.submit_compute(&mut self.device, handle)?;
        self.pipeline.submit_graphics(&mut self.device, handle, &self.draws)?;
        Ok(())
    }

    /// Present the frame and advance the ring
    pub fn end_frame(&mut self, handle: &FrameHandle) -> RenderResult<()> {
        Ok(self.pipeline.end_frame(&mut self.device, handle)?)
    }

    fn update_records(&mut self, scene: &dyn SceneView, changes: &TickChanges) -> RenderResult<()> {
        let registered: Vec<LayerId> = self.layers.iter().map(|layer| layer.id()).collect();
        let registered = &registered;
        let tracked = || {
            changes
                .iter()
                .filter(move |(layer, _)| registered.contains(layer))
        };

        // Destroys first so their slots are reusable by this tick's creations
        for (layer, layer_changes) in tracked() {
            for &object in &layer_changes.destroyed {
                self.objects.detach_layer(object, layer, &mut self.resources)?;
            }
        }

        for (layer, layer_changes) in tracked() {
            for &object in &layer_changes.updated {
                let Some(descriptor) = scene.object(object) else {
                    log::trace!("{} vanished before its update in {}", object, layer);
                    continue;
                };
                self.objects
                    .upsert(object, layer, &descriptor, &mut self.resources)?;
            }
        }
        Ok(())
    }

    fn compile_layers(&mut self, scene: &dyn SceneView, changes: &TickChanges) -> RenderResult<()> {
        let mut changed = false;
        for layer in &mut self.layers {
            if let Some(layer_changes) = changes.layer(layer.id()) {
                changed |= layer.compile_batches(layer_changes, &self.objects, scene);
            }
        }
        if !changed {
            return Ok(());
        }

        let required: usize = self.layers.iter().map(|layer| layer.commands().len()).sum();
        let capacity = self.config.max_draw_commands;
        if required > capacity as usize {
            log::error!("Draw-command buffer overflow: {} > {}", required, capacity);
            return Err(RenderError::DrawBufferOverflow {
                required: u32::try_from(required).unwrap_or(u32::MAX),
                capacity,
            });
        }

        self.commands.clear();
        self.draws.clear();
        for layer in &mut self.layers {
            layer.set_base_offset(self.commands.len() as u32);
            self.commands.extend_from_slice(layer.commands());
            layer.bind_for_draw(&mut self.draws);
        }
        self.draw_version += 1;
        log::debug!(
            "Draw buffer rebuilt: {} commands in {} draws across {} layers",
            self.commands.len(),
            self.draws.len(),
            self.layers.len()
        );
        Ok(())
    }

    fn upload(&mut self, frame: usize, globals: &FrameGlobals) -> RenderResult<()> {
        let record_size = std::mem::size_of::<ObjectRecord>() as u64;
        for run in self.objects.take_dirty(frame) {
            let offset = u64::from(run.start) * record_size;
            self.device
                .upload(frame, UploadTarget::ObjectRecords, offset, self.objects.record_bytes(run))?;
        }

        let binding_size = std::mem::size_of::<ResourceBinding>() as u64;
        for run in self.resources.take_dirty(frame) {
            let offset = u64::from(run.start) * binding_size;
            self.device
                .upload(frame, UploadTarget::ResourceBindings, offset, self.resources.binding_bytes(run))?;
        }

        if let Some(uploaded) = self.uploaded_draw_version.get_mut(frame) {
            if *uploaded != Some(self.draw_version) {
                self.device
                    .upload(frame, UploadTarget::DrawCommands, 0, bytemuck::cast_slice(&self.commands))?;
                *uploaded = Some(self.draw_version);
            }
        }

        self.device
            .upload(frame, UploadTarget::FrameGlobals, 0, bytemuck::bytes_of(globals))?;
        Ok(())
    }

    /// Drain in-flight frames and release every device object
    ///
    /// Returns the device so the caller can tear it down.
    pub fn shutdown(self) -> RenderResult<D> {
        let Self {
            pipeline,
            mut device,
            ..
        } = self;
        pipeline.destroy(&mut device)?;
        device.wait_idle()?;
        log::info!("Renderer shut down");
        Ok(device)
    }

    /// Current counters
    pub fn stats(&self) -> RendererStats {
        RendererStats {
            frames: self.pipeline.stats(),
            live_objects: self.objects.len(),
            live_resources: self.resources.len(),
            draw_commands: self.commands.len(),
            indirect_draws: self.draws.len(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable access to the device
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The frame pipeline
    pub fn pipeline(&self) -> &FramePipeline<D> {
        &self.pipeline
    }

    /// The resource binding table
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// The object record table
    pub fn objects(&self) -> &ObjectRecordTable {
        &self.objects
    }

    /// A registered layer
    pub fn layer(&self, id: LayerId) -> Option<&dyn Layer> {
        self.layers
            .iter()
            .find(|layer| layer.id() == id)
            .map(|layer| &**layer)
    }

    /// The shared draw-command list, all layers concatenated
    pub fn draw_commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Multi-draw calls issued each frame
    pub fn indirect_draws(&self) -> &[IndirectDraw] {
        &self.draws
    }
}
