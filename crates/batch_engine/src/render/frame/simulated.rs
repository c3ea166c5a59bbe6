//! Deterministic in-memory device
//!
//! Models an in-order GPU queue closely enough to catch synchronisation
//! mistakes without a GPU:
//!
//! - fences are `Signaled`, `Unsignaled` or `Pending` behind a submission;
//!   waiting on a pending fence retires every earlier submission, waiting on
//!   an unsignalled fence that nothing will signal is a timeout
//! - submitting with a fence that is not unsignalled is rejected
//! - binary semaphores must be signalled exactly once before each wait
//!
//! Every call is appended to an event log that tests inspect.

use std::collections::{HashMap, VecDeque};

use super::device::{
    ComputeSubmit, DeviceError, DeviceResult, FrameDevice, GraphicsSubmit, PresentStatus, UploadTarget,
};
use crate::render::batching::IndirectDraw;

/// Fence handle of the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimFence(pub u32);

/// Semaphore handle of the simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimSemaphore(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
    Destroyed,
}

/// One recorded device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A fence wait returned
    WaitFence(SimFence),
    /// A fence was reset
    ResetFence(SimFence),
    /// A pending fence was signalled by finished work
    Completed(SimFence),
    /// An image was acquired
    Acquire {
        /// Image index
        image: u32,
    },
    /// Data was written into a frame's buffer
    Upload {
        /// Ring position
        frame: usize,
        /// Buffer written
        target: UploadTarget,
        /// Byte offset of the write
        offset: u64,
        /// Bytes written
        len: usize,
    },
    /// Compute work was submitted
    SubmitCompute {
        /// Ring position
        frame: usize,
        /// Fence signalled on completion
        fence: SimFence,
    },
    /// Graphics work was submitted
    SubmitGraphics {
        /// Ring position
        frame: usize,
        /// Image rendered into
        image: u32,
        /// Fence signalled on completion
        fence: SimFence,
        /// Multi-draw calls issued
        draws: Vec<IndirectDraw>,
    },
    /// An image was presented
    Present {
        /// Image index
        image: u32,
    },
    /// Whole-device wait
    WaitIdle,
    /// Presentation targets were recreated
    RebuildTargets,
}

/// Simulated [`FrameDevice`]
#[derive(Debug)]
pub struct SimulatedDevice {
    fences: Vec<FenceState>,
    semaphores: Vec<Option<bool>>,
    pending: VecDeque<SimFence>,
    image_count: u32,
    rebuilt_image_count: Option<u32>,
    next_image: u32,
    acquire_order: VecDeque<u32>,
    acquire_failures: VecDeque<DeviceError>,
    submit_failures: VecDeque<DeviceError>,
    present_results: VecDeque<DeviceResult<PresentStatus>>,
    buffers: HashMap<(usize, UploadTarget), Vec<u8>>,
    events: Vec<DeviceEvent>,
}

impl SimulatedDevice {
    /// Device with `image_count` presentation images acquired round-robin
    pub fn new(image_count: u32) -> Self {
        Self {
            fences: Vec::new(),
            semaphores: Vec::new(),
            pending: VecDeque::new(),
            image_count,
            rebuilt_image_count: None,
            next_image: 0,
            acquire_order: VecDeque::new(),
            acquire_failures: VecDeque::new(),
            submit_failures: VecDeque::new(),
            present_results: VecDeque::new(),
            buffers: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Script the images returned by the next acquires
    pub fn script_acquire_order(&mut self, images: impl IntoIterator<Item = u32>) {
        self.acquire_order.extend(images);
    }

    /// Make the next acquire fail with `error`
    pub fn inject_acquire_failure(&mut self, error: DeviceError) {
        self.acquire_failures.push_back(error);
    }

    /// Make the next compute or graphics submit fail with `error`
    pub fn inject_submit_failure(&mut self, error: DeviceError) {
        self.submit_failures.push_back(error);
    }

    /// Result of the next present
    pub fn inject_present_result(&mut self, result: DeviceResult<PresentStatus>) {
        self.present_results.push_back(result);
    }

    /// Image count after the next target rebuild
    pub fn set_image_count_after_rebuild(&mut self, count: u32) {
        self.rebuilt_image_count = Some(count);
    }

    /// Finish the oldest `count` submissions
    pub fn complete(&mut self, count: usize) {
        for _ in 0..count {
            let Some(fence) = self.pending.pop_front() else {
                break;
            };
            self.signal(fence);
        }
    }

    /// Finish every outstanding submission
    pub fn complete_all(&mut self) {
        self.complete(self.pending.len());
    }

    /// Whether `fence` is currently signalled
    pub fn is_signaled(&self, fence: SimFence) -> bool {
        self.fences.get(fence.0 as usize) == Some(&FenceState::Signaled)
    }

    /// Submissions not yet finished
    pub fn pending_submissions(&self) -> usize {
        self.pending.len()
    }

    /// Every recorded call, oldest first
    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    /// Forget recorded calls
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Contents of the frame's copy of `target`
    pub fn buffer(&self, frame: usize, target: UploadTarget) -> &[u8] {
        self.buffers
            .get(&(frame, target))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Live fences and semaphores
    pub fn live_objects(&self) -> usize {
        let fences = self
            .fences
            .iter()
            .filter(|state| **state != FenceState::Destroyed)
            .count();
        fences + self.semaphores.iter().filter(|s| s.is_some()).count()
    }

    fn signal(&mut self, fence: SimFence) {
        if let Some(state) = self.fences.get_mut(fence.0 as usize) {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
                self.events.push(DeviceEvent::Completed(fence));
            }
        }
    }

    fn fence_state(&self, fence: SimFence, operation: &'static str) -> DeviceResult<FenceState> {
        match self.fences.get(fence.0 as usize) {
            Some(FenceState::Destroyed) | None => Err(DeviceError::SubmissionFailed {
                operation,
                reason: format!("{fence:?} does not exist"),
            }),
            Some(&state) => Ok(state),
        }
    }

    fn arm_fence(&mut self, fence: SimFence, operation: &'static str) -> DeviceResult<()> {
        let state = self.fence_state(fence, operation)?;
        if state != FenceState::Unsignaled {
            return Err(DeviceError::SubmissionFailed {
                operation,
                reason: format!("{fence:?} submitted while {state:?}"),
            });
        }
        self.fences[fence.0 as usize] = FenceState::Pending;
        self.pending.push_back(fence);
        Ok(())
    }

    fn signal_semaphore(&mut self, semaphore: SimSemaphore, operation: &'static str) -> DeviceResult<()> {
        match self.semaphores.get_mut(semaphore.0 as usize) {
            Some(Some(signaled)) if !*signaled => {
                *signaled = true;
                Ok(())
            }
            Some(Some(_)) => Err(DeviceError::SubmissionFailed {
                operation,
                reason: format!("{semaphore:?} signalled twice without a wait"),
            }),
            _ => Err(DeviceError::SubmissionFailed {
                operation,
                reason: format!("{semaphore:?} does not exist"),
            }),
        }
    }

    fn consume_semaphore(&mut self, semaphore: SimSemaphore, operation: &'static str) -> DeviceResult<()> {
        match self.semaphores.get_mut(semaphore.0 as usize) {
            Some(Some(signaled)) if *signaled => {
                *signaled = false;
                Ok(())
            }
            _ => Err(DeviceError::SubmissionFailed {
                operation,
                reason: format!("wait on {semaphore:?} that nothing signals"),
            }),
        }
    }
}

impl FrameDevice for SimulatedDevice {
    type Fence = SimFence;
    type Semaphore = SimSemaphore;

    fn create_fence(&mut self, signaled: bool) -> DeviceResult<SimFence> {
        let fence = SimFence(self.fences.len() as u32);
        self.fences.push(if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        });
        Ok(fence)
    }

    fn create_semaphore(&mut self) -> DeviceResult<SimSemaphore> {
        let semaphore = SimSemaphore(self.semaphores.len() as u32);
        self.semaphores.push(Some(false));
        Ok(semaphore)
    }

    fn wait_fence(&mut self, fence: SimFence, _timeout_ns: u64) -> DeviceResult<()> {
        match self.fence_state(fence, "wait_fence")? {
            FenceState::Signaled => {}
            FenceState::Pending => {
                // In-order queue: everything submitted before `fence` finishes first
                while let Some(done) = self.pending.pop_front() {
                    self.signal(done);
                    if done == fence {
                        break;
                    }
                }
            }
            FenceState::Unsignaled | FenceState::Destroyed => {
                return Err(DeviceError::Timeout { operation: "wait_fence" });
            }
        }
        self.events.push(DeviceEvent::WaitFence(fence));
        Ok(())
    }

    fn reset_fence(&mut self, fence: SimFence) -> DeviceResult<()> {
        if self.fence_state(fence, "reset_fence")? == FenceState::Pending {
            return Err(DeviceError::SubmissionFailed {
                operation: "reset_fence",
                reason: format!("{fence:?} reset while in use"),
            });
        }
        self.fences[fence.0 as usize] = FenceState::Unsignaled;
        self.events.push(DeviceEvent::ResetFence(fence));
        Ok(())
    }

    fn acquire_image(&mut self, signal: SimSemaphore) -> DeviceResult<u32> {
        if let Some(error) = self.acquire_failures.pop_front() {
            return Err(error);
        }

        let image = match self.acquire_order.pop_front() {
            Some(image) => image,
            None => {
                let image = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count.max(1);
                image
            }
        };
        if image >= self.image_count {
            return Err(DeviceError::SubmissionFailed {
                operation: "acquire_image",
                reason: format!("scripted image {image} out of {} images", self.image_count),
            });
        }

        self.signal_semaphore(signal, "acquire_image")?;
        self.events.push(DeviceEvent::Acquire { image });
        Ok(image)
    }

    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn upload(&mut self, frame: usize, target: UploadTarget, byte_offset: u64, bytes: &[u8]) -> DeviceResult<()> {
        let buffer = self.buffers.entry((frame, target)).or_default();
        let start = byte_offset as usize;
        let end = start + bytes.len();
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[start..end].copy_from_slice(bytes);

        self.events.push(DeviceEvent::Upload {
            frame,
            target,
            offset: byte_offset,
            len: bytes.len(),
        });
        Ok(())
    }

    fn submit_compute(&mut self, submit: ComputeSubmit<SimFence, SimSemaphore>) -> DeviceResult<()> {
        if let Some(error) = self.submit_failures.pop_front() {
            return Err(error);
        }
        self.arm_fence(submit.fence, "submit_compute")?;
        self.signal_semaphore(submit.signal, "submit_compute")?;
        self.events.push(DeviceEvent::SubmitCompute {
            frame: submit.frame,
            fence: submit.fence,
        });
        Ok(())
    }

    fn submit_graphics(&mut self, submit: GraphicsSubmit<'_, SimFence, SimSemaphore>) -> DeviceResult<()> {
        if let Some(error) = self.submit_failures.pop_front() {
            return Err(error);
        }
        self.consume_semaphore(submit.wait_compute, "submit_graphics")?;
        self.consume_semaphore(submit.wait_image, "submit_graphics")?;
        self.arm_fence(submit.fence, "submit_graphics")?;
        self.signal_semaphore(submit.signal, "submit_graphics")?;
        self.events.push(DeviceEvent::SubmitGraphics {
            frame: submit.frame,
            image: submit.image,
            fence: submit.fence,
            draws: submit.draws.to_vec(),
        });
        Ok(())
    }

    fn present(&mut self, image: u32, wait: SimSemaphore) -> DeviceResult<PresentStatus> {
        self.consume_semaphore(wait, "present")?;
        self.events.push(DeviceEvent::Present { image });
        self.present_results
            .pop_front()
            .unwrap_or(Ok(PresentStatus::Optimal))
    }

    fn wait_idle(&mut self) -> DeviceResult<()> {
        self.complete_all();
        self.events.push(DeviceEvent::WaitIdle);
        Ok(())
    }

    fn rebuild_targets(&mut self) -> DeviceResult<()> {
        if let Some(count) = self.rebuilt_image_count.take() {
            self.image_count = count;
        }
        self.next_image = 0;
        self.events.push(DeviceEvent::RebuildTargets);
        Ok(())
    }

    fn destroy_fence(&mut self, fence: SimFence) {
        if let Some(state) = self.fences.get_mut(fence.0 as usize) {
            *state = FenceState::Destroyed;
        }
    }

    fn destroy_semaphore(&mut self, semaphore: SimSemaphore) {
        if let Some(slot) = self.semaphores.get_mut(semaphore.0 as usize) {
            *slot = None;
        }
    }
}
