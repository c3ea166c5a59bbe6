//! Slot-backed device tables
//!
//! ```text
//! SlotAllocator ──► ResourceTable ──► ObjectRecordTable
//!                        │                  │
//!                        └──── DirtyRanges ─┘  (per-frame upload runs)
//! ```

mod object_table;
mod resource_table;
mod slot_allocator;
mod upload;

pub use object_table::{ObjectRecord, ObjectRecordTable, OBJECT_TABLE};
pub use resource_table::{ResourceBinding, ResourceEntry, ResourceTable, RESOURCE_TABLE};
pub use slot_allocator::{SlotAllocator, SlotError, SlotResult};
pub use upload::DirtyRanges;
