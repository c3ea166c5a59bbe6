//! Frames in flight
//!
//! [`FramePipeline`] drives a [`FrameDevice`] through compute, graphics and
//! present for up to N frames at once. [`SimulatedDevice`] stands in for a GPU
//! in tests and headless runs.

mod device;
mod globals;
mod pipeline;
mod simulated;

pub use device::{
    ComputeSubmit, DeviceError, DeviceResult, FrameDevice, GraphicsSubmit, PresentStatus, UploadTarget,
};
pub use globals::FrameGlobals;
pub use pipeline::{FrameError, FrameHandle, FramePipeline, FrameResult, FrameStats, SlotState};
pub use simulated::{DeviceEvent, SimFence, SimSemaphore, SimulatedDevice};
