//! # Batch Engine
//!
//! GPU-resident slot tables and indirect-draw batching driven by a
//! multi-frame-in-flight pipeline.
//!
//! ## Features
//!
//! - **Slot tables**: fixed-capacity resource and object record arrays with
//!   usage-counted resource lifetime
//! - **Layer batching**: per-layer grouping by model into contiguous
//!   multi-draw command runs, rebuilt only when membership changes
//! - **Frames in flight**: an N-deep ring of fences and semaphores spanning a
//!   compute and a graphics stage, with per-image fence tracking
//! - **Device seam**: a simulated device for tests and a Vulkan backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_engine::prelude::*;
//! use nalgebra::Matrix4;
//!
//! fn main() -> Result<(), RenderError> {
//!     let mut ids = IdIssuer::new();
//!     let mut scene = MemoryScene::new();
//!     let mut renderer = Renderer::new(RendererConfig::default(), SimulatedDevice::new(3))?;
//!
//!     let opaque = ids.layer();
//!     renderer.add_layer(Box::new(MeshLayer::new(opaque, "opaque")))?;
//!
//!     let cube = ModelInfo { id: ids.model(), index_count: 36 };
//!     let object = scene.spawn(&mut ids, Matrix4::identity());
//!     scene.set_model(object, Some(cube));
//!     scene.attach(object, opaque);
//!
//!     if let Some(frame) = renderer.begin_frame()? {
//!         let changes = scene.take_changes();
//!         renderer.record_and_submit(&frame, &scene, &changes, &FrameGlobals::default())?;
//!         renderer.end_frame(&frame)?;
//!     }
//!
//!     renderer.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc
)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, RendererConfig, MAX_LAYERS, MAX_LAYER_RESOURCES, NO_RESOURCE},
        foundation::ids::{IdIssuer, LayerId, ModelId, ObjectId, ResourceId},
        render::{
            batching::{BoundsLayer, DrawCommand, IndirectDraw, Layer, MeshLayer},
            frame::{
                DeviceError, FrameDevice, FrameError, FrameGlobals, FrameHandle, FrameStats, PresentStatus,
                SimulatedDevice,
            },
            slots::{ObjectRecord, ObjectRecordTable, ResourceTable, SlotAllocator, SlotError},
            RenderError, RenderResult, Renderer, RendererStats,
        },
        scene::{
            MemoryScene, ModelInfo, ObjectDescriptor, ResourceDescriptor, ResourceRequest, SceneDelta, SceneView,
            TickChanges,
        },
    };
}
