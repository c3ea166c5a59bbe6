//! Rendering core
//!
//! - [`slots`]: fixed-capacity device tables and their allocators
//! - [`batching`]: per-layer compaction into indirect draw commands
//! - [`frame`]: frames in flight and the device seam
//! - [`backends`]: device implementations
//! - [`renderer`]: the composition root tying them together

pub mod backends;
pub mod batching;
pub mod frame;
pub mod renderer;
pub mod slots;

#[cfg(test)]
mod tests;

pub use renderer::{RenderError, RenderResult, Renderer, RendererStats};
