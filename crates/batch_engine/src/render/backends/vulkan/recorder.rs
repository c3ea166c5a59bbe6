use ash::prelude::VkResult;
use ash::{vk, Device};

use crate::foundation::ids::{LayerId, ModelId};

/// Records the pipeline-specific parts of each frame
///
/// The backend owns command buffer begin/end and submission; everything that
/// depends on pipelines, descriptor sets or vertex buffers is delegated here.
pub trait CommandRecorder {
    /// Record the frame's compute dispatches
    fn record_compute(&mut self, device: &Device, commands: vk::CommandBuffer, frame: usize);

    /// Begin the render pass for `image`
    fn begin_graphics(&mut self, device: &Device, commands: vk::CommandBuffer, frame: usize, image: u32);

    /// Bind the pipeline and descriptor sets of `layer`
    fn bind_layer(&mut self, device: &Device, commands: vk::CommandBuffer, frame: usize, layer: LayerId);

    /// Bind the vertex and index buffers of `model`
    fn bind_model(&mut self, device: &Device, commands: vk::CommandBuffer, model: ModelId);

    /// End the render pass
    fn end_graphics(&mut self, device: &Device, commands: vk::CommandBuffer, frame: usize);
}

/// Recreates the swapchain when the surface changes
pub trait SwapchainSource {
    /// Build a replacement for `old` and return it with its image count
    fn recreate(&mut self, old: vk::SwapchainKHR) -> VkResult<(vk::SwapchainKHR, u32)>;
}
