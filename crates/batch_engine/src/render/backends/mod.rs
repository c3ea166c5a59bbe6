//! Device backends implementing [`FrameDevice`](crate::render::frame::FrameDevice)
//!
//! The simulated device lives next to the frame pipeline; real GPUs go
//! through the Vulkan backend here.

/// Vulkan backend over an externally created `ash` device
pub mod vulkan;
