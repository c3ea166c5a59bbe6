//! Per-layer draw batching
//!
//! Each [`Layer`] owns a [`LayerBatchCompiler`] that turns the layer's live
//! objects into a compact run of [`DrawCommand`]s. The renderer concatenates
//! all layers into one shared indirect buffer.

mod compiler;
mod draw_command;
mod layer;

pub use compiler::{LayerBatchCompiler, ModelBatch};
pub use draw_command::{DrawCommand, IndirectDraw};
pub use layer::{BoundsLayer, Layer, MeshLayer};
