//! Indexed-indirect draw commands and the multi-draw calls that consume them

use bytemuck::{Pod, Zeroable};

use crate::foundation::ids::{LayerId, ModelId};

/// One indexed draw in the hardware indirect layout
///
/// Matches `VkDrawIndexedIndirectCommand` field for field so the compacted
/// list can be uploaded as raw bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct DrawCommand {
    /// Indices drawn
    pub index_count: u32,
    /// Instances drawn
    pub instance_count: u32,
    /// First index in the model's index range
    pub first_index: u32,
    /// Added to every index before vertex lookup
    pub vertex_offset: i32,
    /// Instance id of the first instance; the object's record slot
    pub first_instance: u32,
}

impl DrawCommand {
    /// A single instance of a model whose record lives at `record_slot`
    pub const fn single(index_count: u32, record_slot: u32) -> Self {
        Self {
            index_count,
            instance_count: 1,
            first_index: 0,
            vertex_offset: 0,
            first_instance: record_slot,
        }
    }
}

/// One multi-draw call into the shared draw-command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectDraw {
    /// Layer issuing the call
    pub layer: LayerId,
    /// Model whose geometry is bound for the call
    pub model: ModelId,
    /// Index of the first command in the shared buffer
    pub first_command: u32,
    /// Number of consecutive commands drawn
    pub draw_count: u32,
}
