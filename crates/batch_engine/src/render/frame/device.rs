//! Device seam of the frame pipeline
//!
//! Everything the pipeline and the renderer need from the GPU goes through
//! [`FrameDevice`]. Handles are plain copyable values; ownership of the
//! underlying objects stays with the device implementation.

use std::fmt;

use thiserror::Error;

use crate::render::batching::IndirectDraw;

/// Failures reported by a device implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// A queue, fence or semaphore operation failed
    #[error("device {operation} failed: {reason}")]
    SubmissionFailed {
        /// Operation that failed
        operation: &'static str,
        /// Backend-specific description
        reason: String,
    },

    /// The presentation target no longer matches the surface
    #[error("presentation target invalidated")]
    TargetInvalidated,

    /// A wait did not complete within its timeout
    #[error("timed out waiting for {operation}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
    },
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Outcome of a successful present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// Presented and the target still matches the surface
    Optimal,
    /// Presented, but the target should be rebuilt
    Suboptimal,
}

/// Device-visible buffers the renderer uploads into, one copy per frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UploadTarget {
    /// Per-object record array
    ObjectRecords,
    /// Resource binding array
    ResourceBindings,
    /// Shared indirect draw-command buffer
    DrawCommands,
    /// Per-frame camera and time data
    FrameGlobals,
}

impl UploadTarget {
    /// Every target, in a fixed order
    pub const ALL: [Self; 4] = [
        Self::ObjectRecords,
        Self::ResourceBindings,
        Self::DrawCommands,
        Self::FrameGlobals,
    ];
}

/// Compute work of one frame
#[derive(Debug, Clone, Copy)]
pub struct ComputeSubmit<F, S> {
    /// Ring position
    pub frame: usize,
    /// Signalled when the compute work finishes
    pub signal: S,
    /// Signalled with the semaphore, for CPU-side waits
    pub fence: F,
}

/// Graphics work of one frame
#[derive(Debug, Clone, Copy)]
pub struct GraphicsSubmit<'a, F, S> {
    /// Ring position
    pub frame: usize,
    /// Presentation image rendered into
    pub image: u32,
    /// Compute-done semaphore of this frame
    pub wait_compute: S,
    /// Image-available semaphore of this frame
    pub wait_image: S,
    /// Signalled when rendering finishes
    pub signal: S,
    /// The frame's completion fence
    pub fence: F,
    /// Multi-draw calls into the shared command buffer
    pub draws: &'a [IndirectDraw],
}

/// GPU operations used by the frame pipeline
pub trait FrameDevice {
    /// CPU-observable completion signal
    type Fence: Copy + Eq + fmt::Debug;
    /// Device-side ordering signal
    type Semaphore: Copy + Eq + fmt::Debug;

    /// Create a fence, optionally already signalled
    fn create_fence(&mut self, signaled: bool) -> DeviceResult<Self::Fence>;

    /// Create a binary semaphore
    fn create_semaphore(&mut self) -> DeviceResult<Self::Semaphore>;

    /// Block until `fence` is signalled
    fn wait_fence(&mut self, fence: Self::Fence, timeout_ns: u64) -> DeviceResult<()>;

    /// Return `fence` to the unsignalled state
    fn reset_fence(&mut self, fence: Self::Fence) -> DeviceResult<()>;

    /// Acquire the next presentation image, signalling `signal` when it is usable
    fn acquire_image(&mut self, signal: Self::Semaphore) -> DeviceResult<u32>;

    /// Number of presentation images
    fn image_count(&self) -> u32;

    /// Copy `bytes` into the frame's copy of `target` at `byte_offset`
    fn upload(&mut self, frame: usize, target: UploadTarget, byte_offset: u64, bytes: &[u8]) -> DeviceResult<()>;

    /// Submit the frame's compute work
    fn submit_compute(&mut self, submit: ComputeSubmit<Self::Fence, Self::Semaphore>) -> DeviceResult<()>;

    /// Submit the frame's graphics work
    fn submit_graphics(&mut self, submit: GraphicsSubmit<'_, Self::Fence, Self::Semaphore>) -> DeviceResult<()>;

    /// Present `image` once `wait` is signalled
    fn present(&mut self, image: u32, wait: Self::Semaphore) -> DeviceResult<PresentStatus>;

    /// Block until all submitted work has finished
    fn wait_idle(&mut self) -> DeviceResult<()>;

    /// Recreate presentation targets after invalidation
    fn rebuild_targets(&mut self) -> DeviceResult<()>;

    /// Destroy a fence
    fn destroy_fence(&mut self, fence: Self::Fence);

    /// Destroy a semaphore
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);
}
