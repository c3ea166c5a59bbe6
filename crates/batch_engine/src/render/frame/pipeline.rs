//! # Frame Pipeline
//!
//! An N-deep ring of frame slots. Each slot owns the synchronisation objects
//! of one frame in flight:
//!
//! ```text
//! begin_frame     wait in_flight[k]        (CPU may now write slot k)
//!                 acquire ──► image_available[k]
//!                 wait images_in_flight[image] if it belongs to another slot
//! submit_compute  reset compute_fence[k], signal compute_done[k]
//! submit_graphics wait compute_done[k] + image_available[k]
//!                 reset in_flight[k], signal render_finished[k] + in_flight[k]
//! end_frame       present after render_finished[k], k = (k + 1) % N
//! ```
//!
//! The per-image table matters when the number of presentation images differs
//! from N: a slot may be handed an image whose last frame was rendered by a
//! different slot that is still in flight.

use thiserror::Error;

use super::device::{ComputeSubmit, DeviceError, FrameDevice, GraphicsSubmit, PresentStatus};
use crate::render::batching::IndirectDraw;

/// Progress of one ring position through a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Nothing submitted since the slot was (re)initialised
    Idle,
    /// Compute work submitted
    ComputeSubmitted,
    /// Graphics work submitted
    GraphicsSubmitted,
    /// Presented, device work may still be running
    Presented,
}

/// Frame pipeline failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fatal device failure
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A frame step was called out of order
    #[error("frame slot {slot} cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        /// Ring position
        slot: usize,
        /// State the slot was in
        from: SlotState,
        /// State the call would have moved it to
        to: SlotState,
    },

    /// `begin_frame` was called before the previous frame ended
    #[error("frame slot {slot} already has a frame in progress")]
    FrameInProgress {
        /// Ring position
        slot: usize,
    },
}

/// Result type for frame pipeline operations
pub type FrameResult<T> = Result<T, FrameError>;

/// Identifies the frame between `begin_frame` and `end_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle {
    /// Ring position
    pub frame: usize,
    /// Presentation image acquired for the frame
    pub image: u32,
    /// Monotonic frame number
    pub sequence: u64,
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames handed to present
    pub frames_presented: u64,
    /// Drain-and-rebuild cycles
    pub rebuilds: u64,
    /// Waits on a ring slot's own fence
    pub fence_waits: u64,
    /// Extra waits on another slot's fence through the image table
    pub image_fence_waits: u64,
    /// Ticks where `begin_frame` returned no frame
    pub skipped_frames: u64,
}

#[derive(Debug)]
struct FrameSlot<D: FrameDevice> {
    in_flight: D::Fence,
    compute_fence: D::Fence,
    image_available: D::Semaphore,
    compute_done: D::Semaphore,
    render_finished: D::Semaphore,
    state: SlotState,
    image: Option<u32>,
}

impl<D: FrameDevice> FrameSlot<D> {
    fn new(device: &mut D) -> FrameResult<Self> {
        Ok(Self {
            in_flight: device.create_fence(true)?,
            compute_fence: device.create_fence(true)?,
            image_available: device.create_semaphore()?,
            compute_done: device.create_semaphore()?,
            render_finished: device.create_semaphore()?,
            state: SlotState::Idle,
            image: None,
        })
    }

    fn destroy(self, device: &mut D) {
        device.destroy_fence(self.in_flight);
        device.destroy_fence(self.compute_fence);
        device.destroy_semaphore(self.image_available);
        device.destroy_semaphore(self.compute_done);
        device.destroy_semaphore(self.render_finished);
    }
}

/// Ring of frame slots coordinating compute, graphics and present
#[derive(Debug)]
pub struct FramePipeline<D: FrameDevice> {
    slots: Vec<FrameSlot<D>>,
    images_in_flight: Vec<Option<D::Fence>>,
    current: usize,
    sequence: u64,
    rebuild_pending: bool,
    fence_timeout_ns: u64,
    stats: FrameStats,
}

impl<D: FrameDevice> FramePipeline<D> {
    /// Create `depth` frame slots on `device`
    pub fn new(device: &mut D, depth: usize, fence_timeout_ns: u64) -> FrameResult<Self> {
        let slots = (0..depth.max(1))
            .map(|_| FrameSlot::new(device))
            .collect::<FrameResult<Vec<_>>>()?;
        let image_count = device.image_count() as usize;

        log::info!(
            "Frame pipeline: {} frames in flight, {} presentation images",
            slots.len(),
            image_count
        );

        Ok(Self {
            slots,
            images_in_flight: vec![None; image_count],
            current: 0,
            sequence: 0,
            rebuild_pending: false,
            fence_timeout_ns,
            stats: FrameStats::default(),
        })
    }

    /// Start the next frame
    ///
    /// Waits until the current ring position is free, acquires an image and
    /// makes sure no other slot is still rendering into it. Returns `None`
    /// when the presentation target had to be rebuilt instead; the caller
    /// skips the tick.
    pub fn begin_frame(&mut self, device: &mut D) -> FrameResult<Option<FrameHandle>> {
        if self.rebuild_pending {
            self.rebuild(device)?;
            self.stats.skipped_frames += 1;
            return Ok(None);
        }

        let index = self.current;
        let (ring_fence, image_available, busy) = {
            let slot = &self.slots[index];
            (slot.in_flight, slot.image_available, slot.image.is_some())
        };
        if busy {
            return Err(FrameError::FrameInProgress { slot: index });
        }

        // Left signalled; reset happens right before the graphics submit
        device
            .wait_fence(ring_fence, self.fence_timeout_ns)
            .map_err(|e| Self::fatal("frame fence wait", e))?;
        self.stats.fence_waits += 1;

        let image = match device.acquire_image(image_available) {
            Ok(image) => image,
            Err(DeviceError::TargetInvalidated) => {
                log::warn!("Presentation target invalidated during acquire, rebuilding");
                self.rebuild(device)?;
                self.stats.skipped_frames += 1;
                return Ok(None);
            }
            Err(e) => return Err(Self::fatal("image acquire", e)),
        };

        if let Some(previous) = self.image_fence(image) {
            if previous != ring_fence {
                log::trace!("Image {} still owned by another frame, waiting", image);
                device
                    .wait_fence(previous, self.fence_timeout_ns)
                    .map_err(|e| Self::fatal("image fence wait", e))?;
                self.stats.image_fence_waits += 1;
            }
        }
        if let Some(entry) = self.images_in_flight.get_mut(image as usize) {
            *entry = Some(ring_fence);
        }

        let slot = &mut self.slots[index];
        slot.image = Some(image);
        slot.state = SlotState::Idle;

        let handle = FrameHandle {
            frame: index,
            image,
            sequence: self.sequence,
        };
        self.sequence += 1;
        log::trace!("Frame {} began on slot {} with image {}", handle.sequence, index, image);
        Ok(Some(handle))
    }

    /// Submit the compute stage of `handle`'s frame
    pub fn submit_compute(&mut self, device: &mut D, handle: &FrameHandle) -> FrameResult<()> {
        let slot = self.active_slot(handle, SlotState::Idle, SlotState::ComputeSubmitted)?;
        let (fence, signal) = (slot.compute_fence, slot.compute_done);

        device
            .wait_fence(fence, self.fence_timeout_ns)
            .map_err(|e| Self::fatal("compute fence wait", e))?;
        device
            .reset_fence(fence)
            .map_err(|e| Self::fatal("compute fence reset", e))?;
        device
            .submit_compute(ComputeSubmit {
                frame: handle.frame,
                signal,
                fence,
            })
            .map_err(|e| Self::fatal("compute submit", e))?;

        self.slots[handle.frame].state = SlotState::ComputeSubmitted;
        Ok(())
    }

    /// Submit the graphics stage of `handle`'s frame
    pub fn submit_graphics(
        &mut self,
        device: &mut D,
        handle: &FrameHandle,
        draws: &[IndirectDraw],
    ) -> FrameResult<()> {
        let slot = self.active_slot(handle, SlotState::ComputeSubmitted, SlotState::GraphicsSubmitted)?;
        let submit = GraphicsSubmit {
            frame: handle.frame,
            image: handle.image,
            wait_compute: slot.compute_done,
            wait_image: slot.image_available,
            signal: slot.render_finished,
            fence: slot.in_flight,
            draws,
        };

        device
            .reset_fence(submit.fence)
            .map_err(|e| Self::fatal("frame fence reset", e))?;
        device
            .submit_graphics(submit)
            .map_err(|e| Self::fatal("graphics submit", e))?;

        self.slots[handle.frame].state = SlotState::GraphicsSubmitted;
        Ok(())
    }

    /// Present `handle`'s frame and advance the ring
    ///
    /// A suboptimal or invalidated target schedules a rebuild before the next
    /// frame begins.
    pub fn end_frame(&mut self, device: &mut D, handle: &FrameHandle) -> FrameResult<()> {
        let slot = self.active_slot(handle, SlotState::GraphicsSubmitted, SlotState::Presented)?;
        let wait = slot.render_finished;

        match device.present(handle.image, wait) {
            Ok(PresentStatus::Optimal) => {}
            Ok(PresentStatus::Suboptimal) => {
                log::warn!("Presentation target suboptimal, rebuild scheduled");
                self.rebuild_pending = true;
            }
            Err(DeviceError::TargetInvalidated) => {
                log::warn!("Presentation target invalidated during present, rebuild scheduled");
                self.rebuild_pending = true;
            }
            Err(e) => return Err(Self::fatal("present", e)),
        }

        let slot = &mut self.slots[handle.frame];
        slot.state = SlotState::Presented;
        slot.image = None;
        self.stats.frames_presented += 1;
        self.current = (self.current + 1) % self.slots.len();
        Ok(())
    }

    /// Wait for every ring position's outstanding device work
    pub fn drain(&mut self, device: &mut D) -> FrameResult<()> {
        for slot in &self.slots {
            device
                .wait_fence(slot.compute_fence, self.fence_timeout_ns)
                .map_err(|e| Self::fatal("drain compute fence", e))?;
            device
                .wait_fence(slot.in_flight, self.fence_timeout_ns)
                .map_err(|e| Self::fatal("drain frame fence", e))?;
        }
        log::debug!("Drained {} frame slots", self.slots.len());
        Ok(())
    }

    /// Drain, recreate presentation targets and reset the image table
    pub fn rebuild(&mut self, device: &mut D) -> FrameResult<()> {
        if let Some(busy) = self.slots.iter().position(|slot| slot.image.is_some()) {
            return Err(FrameError::FrameInProgress { slot: busy });
        }

        self.drain(device)?;
        device
            .rebuild_targets()
            .map_err(|e| Self::fatal("target rebuild", e))?;

        self.images_in_flight = vec![None; device.image_count() as usize];
        for slot in &mut self.slots {
            slot.state = SlotState::Idle;
        }
        self.rebuild_pending = false;
        self.stats.rebuilds += 1;
        log::info!(
            "Presentation targets rebuilt with {} images",
            self.images_in_flight.len()
        );
        Ok(())
    }

    /// Drain and destroy every synchronisation object
    pub fn destroy(mut self, device: &mut D) -> FrameResult<()> {
        self.drain(device)?;
        for slot in self.slots.drain(..) {
            slot.destroy(device);
        }
        log::info!("Frame pipeline destroyed after {} frames", self.stats.frames_presented);
        Ok(())
    }

    fn active_slot(&self, handle: &FrameHandle, from: SlotState, to: SlotState) -> FrameResult<&FrameSlot<D>> {
        let invalid = |state| FrameError::InvalidTransition {
            slot: handle.frame,
            from: state,
            to,
        };
        let slot = self.slots.get(handle.frame).ok_or(invalid(from))?;
        if handle.frame != self.current || slot.image != Some(handle.image) || slot.state != from {
            return Err(invalid(slot.state));
        }
        Ok(slot)
    }

    fn fatal(operation: &'static str, error: DeviceError) -> FrameError {
        log::error!("Fatal device error during {}: {}", operation, error);
        FrameError::Device(error)
    }

    /// Ring position the next frame will use
    pub fn current_frame(&self) -> usize {
        self.current
    }

    /// Number of ring positions
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// State of ring position `frame`
    pub fn state(&self, frame: usize) -> Option<SlotState> {
        self.slots.get(frame).map(|slot| slot.state)
    }

    /// Completion fence of ring position `frame`
    pub fn frame_fence(&self, frame: usize) -> Option<D::Fence> {
        self.slots.get(frame).map(|slot| slot.in_flight)
    }

    /// Fence of the frame that last rendered into `image`
    pub fn image_fence(&self, image: u32) -> Option<D::Fence> {
        self.images_in_flight.get(image as usize).copied().flatten()
    }

    /// Whether a rebuild will run on the next `begin_frame`
    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    /// Pipeline counters
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}
