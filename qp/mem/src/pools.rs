//! Fixed-block memory pool.
//!
//! A pool owns `n_blocks` slots of one block size. Free slots are chained in
//! an index-linked free list, so both `get` and `put` take constant time. The
//! bookkeeping (free list, counters, per-block reference counters) is guarded
//! by the critical section; the slot contents are guarded per block so that a
//! payload can be read without holding the critical section.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::RefCell;

use critical_section::Mutex;
use qp_core::{q_assert, q_error, q_require, Margin};
use spin::{RwLock, RwLockReadGuard};

use crate::QPoolStats;

/// End-of-list marker
const NIL: u16 = u16::MAX;

#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    next: u16,
    ref_ctr: u8,
    in_use: bool,
}

#[derive(Debug)]
struct Control {
    free_head: u16,
    n_free: u16,
    n_min: u16,
    blocks: Box<[BlockHeader]>,
}

/// Fixed-size block pool holding values of type `T`.
pub struct QMPool<T> {
    block_size: usize,
    n_tot: u16,
    control: Mutex<RefCell<Control>>,
    slots: Box<[RwLock<Option<T>>]>,
}

impl<T> QMPool<T> {
    /// Builds a pool of `n_blocks` blocks of `block_size` bytes each.
    pub fn new(n_blocks: u16, block_size: usize) -> Self {
        q_require!(
            n_blocks > 0 && n_blocks < NIL,
            "pool needs 1..{} blocks, got {}",
            NIL,
            n_blocks
        );
        q_require!(block_size > 0, "pool block size must be non-zero");

        let blocks: Vec<BlockHeader> = (0..n_blocks)
            .map(|i| BlockHeader {
                next: if i + 1 < n_blocks { i + 1 } else { NIL },
                ref_ctr: 0,
                in_use: false,
            })
            .collect();
        let slots: Vec<RwLock<Option<T>>> = (0..n_blocks).map(|_| RwLock::new(None)).collect();

        Self {
            block_size,
            n_tot: n_blocks,
            control: Mutex::new(RefCell::new(Control {
                free_head: 0,
                n_free: n_blocks,
                n_min: n_blocks,
                blocks: blocks.into_boxed_slice(),
            })),
            slots: slots.into_boxed_slice(),
        }
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total number of blocks
    pub fn n_tot(&self) -> u16 {
        self.n_tot
    }

    /// Takes a block out of the pool.
    ///
    /// Returns `None` when the margin is not met. Running out under
    /// [`Margin::Strict`] is a contract violation.
    pub fn get(&self, margin: Margin) -> Option<u16> {
        let block = critical_section::with(|cs| {
            let mut guard = self.control.borrow_ref_mut(cs);
            let ctrl = &mut *guard;
            if !margin.admits(ctrl.n_free) {
                return None;
            }

            let block = ctrl.free_head;
            q_assert!(block != NIL, "free list empty with {} free blocks", ctrl.n_free);
            let header = &mut ctrl.blocks[usize::from(block)];
            q_assert!(!header.in_use, "block {} on the free list is in use", block);
            ctrl.free_head = header.next;
            header.next = NIL;
            header.ref_ctr = 0;
            header.in_use = true;

            ctrl.n_free -= 1;
            if ctrl.n_free < ctrl.n_min {
                ctrl.n_min = ctrl.n_free;
            }
            Some(block)
        });

        if block.is_none() && margin.is_strict() {
            q_error!("pool of {}-byte blocks exhausted", self.block_size);
        }
        block
    }

    /// Returns a block to the pool. The slot must already be empty.
    pub fn put(&self, block: u16) {
        q_require!(block < self.n_tot, "block {} outside pool of {}", block, self.n_tot);
        critical_section::with(|cs| {
            let mut guard = self.control.borrow_ref_mut(cs);
            let ctrl = &mut *guard;
            q_require!(ctrl.n_free < self.n_tot, "put into a full pool");
            let header = &mut ctrl.blocks[usize::from(block)];
            q_require!(header.in_use, "block {} returned twice", block);

            header.in_use = false;
            header.ref_ctr = 0;
            header.next = ctrl.free_head;
            ctrl.free_head = block;
            ctrl.n_free += 1;
        });
    }

    /// Stores a value in a checked-out block.
    pub fn store(&self, block: u16, value: T) {
        self.require_in_use(block);
        *self.slots[usize::from(block)].write() = Some(value);
    }

    /// Moves the value out of a checked-out block.
    pub fn take(&self, block: u16) -> Option<T> {
        self.require_in_use(block);
        self.slots[usize::from(block)].write().take()
    }

    /// Shared access to the value of a checked-out block.
    pub fn read(&self, block: u16) -> RwLockReadGuard<'_, Option<T>> {
        self.require_in_use(block);
        self.slots[usize::from(block)].read()
    }

    /// Reference counter of a checked-out block
    pub fn ref_ctr(&self, block: u16) -> u8 {
        self.require_in_use(block);
        critical_section::with(|cs| self.control.borrow_ref(cs).blocks[usize::from(block)].ref_ctr)
    }

    /// Counts one more reference; returns the new count.
    pub fn retain(&self, block: u16) -> u8 {
        self.require_in_use(block);
        let ctr = critical_section::with(|cs| {
            let mut ctrl = self.control.borrow_ref_mut(cs);
            let header = &mut ctrl.blocks[usize::from(block)];
            header.ref_ctr = header.ref_ctr.checked_add(1)?;
            Some(header.ref_ctr)
        });
        match ctr {
            Some(ctr) => ctr,
            None => q_error!("reference counter of block {} overflowed", block),
        }
    }

    /// Drops one reference.
    ///
    /// Returns the remaining count while other holders exist, or `None` when
    /// the caller held the last reference and must recycle the block.
    pub fn release(&self, block: u16) -> Option<u8> {
        self.require_in_use(block);
        critical_section::with(|cs| {
            let mut ctrl = self.control.borrow_ref_mut(cs);
            let header = &mut ctrl.blocks[usize::from(block)];
            if header.ref_ctr > 1 {
                header.ref_ctr -= 1;
                Some(header.ref_ctr)
            } else {
                None
            }
        })
    }

    /// Drops the value of a block and returns the block to the pool.
    pub fn recycle(&self, block: u16) {
        drop(self.take(block));
        self.put(block);
    }

    /// Number of free blocks
    pub fn n_free(&self) -> u16 {
        critical_section::with(|cs| self.control.borrow_ref(cs).n_free)
    }

    /// Low-water mark of free blocks
    pub fn n_min(&self) -> u16 {
        critical_section::with(|cs| self.control.borrow_ref(cs).n_min)
    }

    /// Consistent snapshot of the pool counters
    pub fn stats(&self) -> QPoolStats {
        critical_section::with(|cs| {
            let ctrl = self.control.borrow_ref(cs);
            QPoolStats {
                block_size: self.block_size,
                total_blocks: self.n_tot,
                free_blocks: ctrl.n_free,
                min_free_blocks: ctrl.n_min,
            }
        })
    }

    fn require_in_use(&self, block: u16) {
        q_require!(block < self.n_tot, "block {} outside pool of {}", block, self.n_tot);
        let in_use =
            critical_section::with(|cs| self.control.borrow_ref(cs).blocks[usize::from(block)].in_use);
        q_require!(in_use, "block {} is not checked out", block);
    }
}

impl<T> core::fmt::Debug for QMPool<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QMPool")
            .field("block_size", &self.block_size)
            .field("n_tot", &self.n_tot)
            .field("n_free", &self.n_free())
            .finish()
    }
}
