#![no_std]
#![forbid(unsafe_code)]

//! # QP Memory Management
//!
//! Fixed-block memory pools and the event-pool set behind dynamic events.
//! Every allocation takes constant time and never touches the heap once the
//! pools are built, which keeps event traffic deterministic.

extern crate alloc;

pub mod events;
pub mod pools;

pub use events::{GcOutcome, QEvtPools};
pub use pools::QMPool;

/// Memory pool statistics for debugging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QPoolStats {
    /// Size in bytes of every block in the pool
    pub block_size: usize,
    /// Total number of blocks in the pool
    pub total_blocks: u16,
    /// Number of free blocks currently available
    pub free_blocks: u16,
    /// Minimum number of free blocks ever reached
    pub min_free_blocks: u16,
}

impl QPoolStats {
    /// Number of blocks currently checked out
    pub const fn in_use(&self) -> u16 {
        self.total_blocks - self.free_blocks
    }

    /// Check if every block is checked out
    pub const fn is_exhausted(&self) -> bool {
        self.free_blocks == 0
    }

    /// Check if no block is checked out
    pub const fn is_idle(&self) -> bool {
        self.free_blocks == self.total_blocks
    }

    /// Peak share of the pool ever checked out, in percent
    pub fn peak_utilization(&self) -> u8 {
        if self.total_blocks == 0 {
            0
        } else {
            let peak = u32::from(self.total_blocks - self.min_free_blocks);
            ((peak * 100) / u32::from(self.total_blocks)) as u8
        }
    }

    /// Current share of the pool checked out, in percent
    pub fn utilization(&self) -> u8 {
        if self.total_blocks == 0 {
            0
        } else {
            ((u32::from(self.in_use()) * 100) / u32::from(self.total_blocks)) as u8
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QPoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "QPoolStats(block={}, total={}, free={}, min={})",
            self.block_size,
            self.total_blocks,
            self.free_blocks,
            self.min_free_blocks
        );
    }
}
