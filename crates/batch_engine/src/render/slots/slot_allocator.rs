//! Fixed-capacity slot allocator
//!
//! Hands out integer indices into a capacity-bounded device array. Freed slots
//! go on a stack so the most recently released slot is reused first, which
//! keeps live records clustered at the front of the table.
//!
//! ```text
//! capacity = 4
//!   allocate() -> 0     free: [3, 2, 1]
//!   allocate() -> 1     free: [3, 2]
//!   free(0)             free: [3, 2, 0]
//!   allocate() -> 0     free: [3, 2]
//! ```

use thiserror::Error;

/// Failures of slot-backed tables
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// No unused slot remains in the table
    #[error("{table} table exhausted: all {capacity} slots are in use")]
    CapacityExhausted {
        /// Table that ran out
        table: &'static str,
        /// Configured capacity of the table
        capacity: u32,
    },

    /// A slot was freed more times than it was allocated, or is out of range
    #[error("{table} table: slot {slot} is not currently allocated")]
    DoubleFreeOrInvalidHandle {
        /// Table the bad free was issued against
        table: &'static str,
        /// Offending slot index
        slot: u32,
    },
}

/// Result alias for slot operations
pub type SlotResult<T> = Result<T, SlotError>;

/// Free-list allocator over `[0, capacity)`
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    table: &'static str,
    capacity: u32,
    free: Vec<u32>,
    in_use: Vec<bool>,
    allocated: u32,
}

impl SlotAllocator {
    /// Create an allocator with every slot free
    pub fn new(table: &'static str, capacity: u32) -> Self {
        // Reversed so slot 0 comes off the stack first
        let free: Vec<u32> = (0..capacity).rev().collect();
        log::debug!("Created slot allocator for {} with {} slots", table, capacity);
        Self {
            table,
            capacity,
            free,
            in_use: vec![false; capacity as usize],
            allocated: 0,
        }
    }

    /// Take an unused slot
    pub fn allocate(&mut self) -> SlotResult<u32> {
        if self.allocated >= self.capacity {
            return Err(SlotError::CapacityExhausted {
                table: self.table,
                capacity: self.capacity,
            });
        }

        let slot = self.free.pop().ok_or(SlotError::CapacityExhausted {
            table: self.table,
            capacity: self.capacity,
        })?;
        self.in_use[slot as usize] = true;
        self.allocated += 1;
        log::trace!("{}: allocated slot {} ({}/{})", self.table, slot, self.allocated, self.capacity);
        Ok(slot)
    }

    /// Return a slot for reuse
    pub fn free(&mut self, slot: u32) -> SlotResult<()> {
        let invalid = SlotError::DoubleFreeOrInvalidHandle {
            table: self.table,
            slot,
        };

        if self.allocated == 0 || slot >= self.capacity || !self.in_use[slot as usize] {
            return Err(invalid);
        }

        self.in_use[slot as usize] = false;
        self.allocated -= 1;
        self.free.push(slot);
        log::trace!("{}: freed slot {} ({}/{})", self.table, slot, self.allocated, self.capacity);
        Ok(())
    }

    /// Whether `slot` is currently held by some owner
    pub fn is_allocated(&self, slot: u32) -> bool {
        self.in_use.get(slot as usize).copied().unwrap_or(false)
    }

    /// Number of slots currently held
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Number of slots still available
    pub fn available(&self) -> u32 {
        self.capacity - self.allocated
    }

    /// Total slots managed by this allocator
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Name of the table this allocator backs
    pub fn table(&self) -> &'static str {
        self.table
    }
}
