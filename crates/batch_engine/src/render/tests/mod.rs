//! Scenario tests across slot tables, batching and the frame pipeline

mod renderer_tests;

use crate::render::frame::{FrameDevice, FrameGlobals, FrameHandle, FramePipeline, SimulatedDevice};
use crate::render::Renderer;
use crate::scene::{MemoryScene, TickChanges};

/// Run one full frame on a bare pipeline with no draws
fn run_pipeline_frame<D: FrameDevice>(pipeline: &mut FramePipeline<D>, device: &mut D) -> Option<FrameHandle> {
    let handle = pipeline.begin_frame(device).unwrap()?;
    pipeline.submit_compute(device, &handle).unwrap();
    pipeline.submit_graphics(device, &handle, &[]).unwrap();
    pipeline.end_frame(device, &handle).unwrap();
    Some(handle)
}

/// Run one renderer tick, draining scene changes only when a frame began
fn tick(renderer: &mut Renderer<SimulatedDevice>, scene: &mut MemoryScene) -> Option<TickChanges> {
    let handle = renderer.begin_frame().unwrap()?;
    let changes = scene.take_changes();
    renderer
        .record_and_submit(&handle, &*scene, &changes, &FrameGlobals::default())
        .unwrap();
    renderer.end_frame(&handle).unwrap();
    Some(changes)
}
