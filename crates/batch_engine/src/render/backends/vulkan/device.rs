//! [`FrameDevice`] over `ash`

use ash::extensions::khr::Swapchain;
use ash::{vk, Device};

use super::memory::MappedBuffer;
use super::recorder::{CommandRecorder, SwapchainSource};
use crate::render::batching::{DrawCommand, IndirectDraw};
use crate::render::frame::{
    ComputeSubmit, DeviceError, DeviceResult, FrameDevice, GraphicsSubmit, PresentStatus, UploadTarget,
};

/// Queues the backend submits to
#[derive(Debug, Clone, Copy)]
pub struct VulkanQueues {
    /// Queue for compute work
    pub compute: vk::Queue,
    /// Queue for graphics work
    pub graphics: vk::Queue,
    /// Queue for presentation
    pub present: vk::Queue,
}

/// Command buffers and mapped buffers of one frame slot
#[derive(Debug)]
pub struct VulkanFrameResources {
    /// Re-recorded every frame for compute work
    pub compute_commands: vk::CommandBuffer,
    /// Re-recorded every frame for graphics work
    pub graphics_commands: vk::CommandBuffer,
    /// Object record array
    pub object_records: MappedBuffer,
    /// Resource binding array
    pub resource_bindings: MappedBuffer,
    /// Indirect draw-command buffer
    pub draw_commands: MappedBuffer,
    /// Frame globals uniform buffer
    pub frame_globals: MappedBuffer,
}

impl VulkanFrameResources {
    fn target_mut(&mut self, target: UploadTarget) -> &mut MappedBuffer {
        match target {
            UploadTarget::ObjectRecords => &mut self.object_records,
            UploadTarget::ResourceBindings => &mut self.resource_bindings,
            UploadTarget::DrawCommands => &mut self.draw_commands,
            UploadTarget::FrameGlobals => &mut self.frame_globals,
        }
    }
}

/// Vulkan implementation of [`FrameDevice`]
pub struct VulkanFrameDevice<R, S> {
    device: Device,
    swapchain_loader: Swapchain,
    swapchain: vk::SwapchainKHR,
    image_count: u32,
    queues: VulkanQueues,
    frames: Vec<VulkanFrameResources>,
    recorder: R,
    source: S,
}

impl<R: CommandRecorder, S: SwapchainSource> VulkanFrameDevice<R, S> {
    /// Drive an existing device and swapchain
    ///
    /// `frames` must hold one entry per frame in flight.
    pub fn new(
        device: Device,
        swapchain_loader: Swapchain,
        swapchain: vk::SwapchainKHR,
        image_count: u32,
        queues: VulkanQueues,
        frames: Vec<VulkanFrameResources>,
        recorder: R,
        source: S,
    ) -> Self {
        log::info!(
            "Vulkan frame device: {} frame slots, {} swapchain images",
            frames.len(),
            image_count
        );
        Self {
            device,
            swapchain_loader,
            swapchain,
            image_count,
            queues,
            frames,
            recorder,
            source,
        }
    }

    /// Current swapchain
    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// The command recorder
    pub fn recorder_mut(&mut self) -> &mut R {
        &mut self.recorder
    }

    fn frame(&self, frame: usize, operation: &'static str) -> DeviceResult<&VulkanFrameResources> {
        self.frames.get(frame).ok_or_else(|| DeviceError::SubmissionFailed {
            operation,
            reason: format!("no resources for frame slot {frame}"),
        })
    }

    fn begin_commands(&self, commands: vk::CommandBuffer, operation: &'static str) -> DeviceResult<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .reset_command_buffer(commands, vk::CommandBufferResetFlags::empty())
                .map_err(|e| map_result(operation, e))?;
            self.device
                .begin_command_buffer(commands, &begin_info)
                .map_err(|e| map_result(operation, e))
        }
    }

    fn end_commands(&self, commands: vk::CommandBuffer, operation: &'static str) -> DeviceResult<()> {
        unsafe {
            self.device
                .end_command_buffer(commands)
                .map_err(|e| map_result(operation, e))
        }
    }
}

/// Translate a Vulkan error into the device error space
pub(crate) fn map_result(operation: &'static str, result: vk::Result) -> DeviceError {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::ERROR_SURFACE_LOST_KHR => DeviceError::TargetInvalidated,
        vk::Result::TIMEOUT | vk::Result::NOT_READY => DeviceError::Timeout { operation },
        other => DeviceError::SubmissionFailed {
            operation,
            reason: format!("{other:?}"),
        },
    }
}

impl<R: CommandRecorder, S: SwapchainSource> FrameDevice for VulkanFrameDevice<R, S> {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;

    fn create_fence(&mut self, signaled: bool) -> DeviceResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe {
            self.device
                .create_fence(&create_info, None)
                .map_err(|e| map_result("create_fence", e))
        }
    }

    fn create_semaphore(&mut self) -> DeviceResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        unsafe {
            self.device
                .create_semaphore(&create_info, None)
                .map_err(|e| map_result("create_semaphore", e))
        }
    }

    fn wait_fence(&mut self, fence: vk::Fence, timeout_ns: u64) -> DeviceResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[fence], true, timeout_ns)
                .map_err(|e| map_result("wait_fence", e))
        }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> DeviceResult<()> {
        unsafe {
            self.device
                .reset_fences(&[fence])
                .map_err(|e| map_result("reset_fence", e))
        }
    }

    fn acquire_image(&mut self, signal: vk::Semaphore) -> DeviceResult<u32> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
        };
        match result {
            // Suboptimal acquires still render; present reports it
            Ok((image, _suboptimal)) => Ok(image),
            Err(e) => Err(map_result("acquire_image", e)),
        }
    }

    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn upload(&mut self, frame: usize, target: UploadTarget, byte_offset: u64, bytes: &[u8]) -> DeviceResult<()> {
        let resources = self.frames.get_mut(frame).ok_or_else(|| DeviceError::SubmissionFailed {
            operation: "upload",
            reason: format!("no resources for frame slot {frame}"),
        })?;
        resources.target_mut(target).write(byte_offset, bytes)
    }

    fn submit_compute(&mut self, submit: ComputeSubmit<vk::Fence, vk::Semaphore>) -> DeviceResult<()> {
        let commands = self.frame(submit.frame, "submit_compute")?.compute_commands;

        self.begin_commands(commands, "submit_compute")?;
        self.recorder.record_compute(&self.device, commands, submit.frame);
        self.end_commands(commands, "submit_compute")?;

        let command_buffers = [commands];
        let signal_semaphores = [submit.signal];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.queues.compute, &[submit_info.build()], submit.fence)
                .map_err(|e| map_result("submit_compute", e))
        }
    }

    fn submit_graphics(&mut self, submit: GraphicsSubmit<'_, vk::Fence, vk::Semaphore>) -> DeviceResult<()> {
        let (commands, draw_buffer) = {
            let resources = self.frame(submit.frame, "submit_graphics")?;
            (resources.graphics_commands, resources.draw_commands.buffer())
        };
        let stride = std::mem::size_of::<DrawCommand>() as u32;

        self.begin_commands(commands, "submit_graphics")?;
        self.recorder
            .begin_graphics(&self.device, commands, submit.frame, submit.image);

        let mut bound_layer = None;
        for draw in submit.draws {
            let IndirectDraw {
                layer,
                model,
                first_command,
                draw_count,
            } = *draw;
            if bound_layer != Some(layer) {
                self.recorder.bind_layer(&self.device, commands, submit.frame, layer);
                bound_layer = Some(layer);
            }
            self.recorder.bind_model(&self.device, commands, model);
            unsafe {
                self.device.cmd_draw_indexed_indirect(
                    commands,
                    draw_buffer,
                    u64::from(first_command) * u64::from(stride),
                    draw_count,
                    stride,
                );
            }
        }

        self.recorder.end_graphics(&self.device, commands, submit.frame);
        self.end_commands(commands, "submit_graphics")?;

        let wait_semaphores = [submit.wait_compute, submit.wait_image];
        let wait_stages = [
            vk::PipelineStageFlags::DRAW_INDIRECT | vk::PipelineStageFlags::VERTEX_INPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ];
        let command_buffers = [commands];
        let signal_semaphores = [submit.signal];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.queues.graphics, &[submit_info.build()], submit.fence)
                .map_err(|e| map_result("submit_graphics", e))
        }
    }

    fn present(&mut self, image: u32, wait: vk::Semaphore) -> DeviceResult<PresentStatus> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(self.queues.present, &present_info) } {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(e) => Err(map_result("present", e)),
        }
    }

    fn wait_idle(&mut self) -> DeviceResult<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| map_result("wait_idle", e))
        }
    }

    fn rebuild_targets(&mut self) -> DeviceResult<()> {
        self.wait_idle()?;
        let (swapchain, image_count) = self
            .source
            .recreate(self.swapchain)
            .map_err(|e| map_result("rebuild_targets", e))?;
        self.swapchain = swapchain;
        self.image_count = image_count;
        log::info!("Swapchain recreated with {} images", image_count);
        Ok(())
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe {
            self.device.destroy_fence(fence, None);
        }
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe {
            self.device.destroy_semaphore(semaphore, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_date_maps_to_invalidated() {
        assert_eq!(
            map_result("present", vk::Result::ERROR_OUT_OF_DATE_KHR),
            DeviceError::TargetInvalidated
        );
        assert_eq!(
            map_result("wait_fence", vk::Result::TIMEOUT),
            DeviceError::Timeout { operation: "wait_fence" }
        );
        assert!(matches!(
            map_result("submit_graphics", vk::Result::ERROR_DEVICE_LOST),
            DeviceError::SubmissionFailed { operation: "submit_graphics", .. }
        ));
    }
}
