//! Vulkan backend
//!
//! Device, queue and swapchain creation stay with the application. This
//! backend only drives them: sync objects, per-frame command buffers, uploads
//! into host-coherent memory and indirect multi-draw submission.

mod device;
mod memory;
mod recorder;

pub use device::{VulkanFrameDevice, VulkanFrameResources, VulkanQueues};
pub use memory::MappedBuffer;
pub use recorder::{CommandRecorder, SwapchainSource};
