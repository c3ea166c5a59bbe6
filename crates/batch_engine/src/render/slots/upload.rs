//! Per-frame dirty tracking
//!
//! Every ring position keeps its own copy of each device table. A write marks
//! the slot dirty for all positions, and each position drains only its own set
//! when it uploads, so a slot written once reaches every copy exactly once.

use std::collections::BTreeSet;
use std::ops::Range;

/// Slots written since each ring position last uploaded
#[derive(Debug, Clone)]
pub struct DirtyRanges {
    frames: Vec<BTreeSet<u32>>,
}

impl DirtyRanges {
    /// Track `frames` ring positions
    pub fn new(frames: usize) -> Self {
        Self {
            frames: vec![BTreeSet::new(); frames],
        }
    }

    /// Mark `slot` as written for every ring position
    pub fn mark(&mut self, slot: u32) {
        for pending in &mut self.frames {
            pending.insert(slot);
        }
    }

    /// Mark every slot in `range` as written
    pub fn mark_range(&mut self, range: Range<u32>) {
        for pending in &mut self.frames {
            pending.extend(range.clone());
        }
    }

    /// Whether `frame` has nothing left to upload
    pub fn is_clean(&self, frame: usize) -> bool {
        self.frames.get(frame).map_or(true, BTreeSet::is_empty)
    }

    /// Drain the pending slots of `frame` as coalesced contiguous runs
    pub fn take(&mut self, frame: usize) -> Vec<Range<u32>> {
        let Some(pending) = self.frames.get_mut(frame) else {
            return Vec::new();
        };

        let mut runs: Vec<Range<u32>> = Vec::new();
        for slot in std::mem::take(pending) {
            match runs.last_mut() {
                Some(run) if run.end == slot => run.end = slot + 1,
                _ => runs.push(slot..slot + 1),
            }
        }
        runs
    }

    /// Number of ring positions tracked
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
