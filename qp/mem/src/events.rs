//! Event pools and reference-counted dynamic events.
//!
//! Dynamic events are carved out of a small set of [`QMPool`]s registered in
//! ascending block-size order. An event is allocated from the first pool
//! whose blocks are big enough, carries a reference counter in its block and
//! goes back to that pool when the last reference is collected.

use alloc::vec::Vec;
use core::mem::size_of;

use log::{debug, warn};
use qp_core::{q_error, q_require, Margin, QEvt, QSignal, MAX_EPOOL_LIMIT};
use spin::RwLockReadGuard;

use crate::{QMPool, QPoolStats};

/// What [`QEvtPools::gc`] did with the event it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcOutcome {
    /// Static event, nothing to do
    Static,
    /// Other references remain; the count left is attached
    Released(u8),
    /// Last reference collected; the block is back in its pool
    Recycled,
}

/// Ordered set of event pools for payload type `P`.
pub struct QEvtPools<P> {
    pools: Vec<QMPool<P>>,
    max_pools: u8,
}

impl<P> QEvtPools<P> {
    /// Creates an empty pool set accepting up to `max_pools` pools.
    pub fn new(max_pools: u8) -> Self {
        q_require!(
            max_pools > 0 && max_pools <= MAX_EPOOL_LIMIT,
            "event pool limit {} outside 1..={}",
            max_pools,
            MAX_EPOOL_LIMIT
        );
        Self {
            pools: Vec::with_capacity(usize::from(max_pools)),
            max_pools,
        }
    }

    /// Registers the next event pool.
    ///
    /// Pools must come in strictly ascending block-size order.
    pub fn pool_init(&mut self, n_blocks: u16, block_size: usize) {
        q_require!(
            self.pools.len() < usize::from(self.max_pools),
            "more than {} event pools",
            self.max_pools
        );
        if let Some(last) = self.pools.last() {
            q_require!(
                block_size > last.block_size(),
                "event pool block size {} not above previous {}",
                block_size,
                last.block_size()
            );
        }

        self.pools.push(QMPool::new(n_blocks, block_size));
        debug!(
            "event pool {} ready: {} blocks of {} bytes",
            self.pools.len(),
            n_blocks,
            block_size
        );
    }

    /// Number of registered pools
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// True before the first pool is registered
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Block size of the largest pool, 0 without pools
    pub fn max_block_size(&self) -> usize {
        self.pools.last().map_or(0, QMPool::block_size)
    }

    /// Allocates an event sized for a full `P`. See [`QEvtPools::new_evt_x`].
    pub fn new_evt(&self, sig: QSignal, payload: P, margin: Margin) -> Option<QEvt> {
        self.new_evt_x(size_of::<P>().max(1), sig, payload, margin)
    }

    /// Allocates an event of `size` bytes carrying `payload`.
    ///
    /// The event comes from the first pool whose block size fits `size`.
    /// Returns `None` when that pool cannot honour `margin`; running out
    /// under [`Margin::Strict`] is a contract violation. The new event has a
    /// reference count of zero.
    pub fn new_evt_x(&self, size: usize, sig: QSignal, payload: P, margin: Margin) -> Option<QEvt> {
        q_require!(!sig.is_reserved(), "dynamic event with reserved signal {}", sig);
        let Some(pool_id) = self.pool_for(size) else {
            q_error!("no event pool fits {} bytes", size)
        };

        let pool = self.pool(pool_id);
        match pool.get(margin) {
            Some(block) => {
                pool.store(block, payload);
                Some(QEvt::from_block(sig, pool_id, block))
            }
            None => {
                warn!("event pool {} below {} for {}", pool_id, margin, sig);
                None
            }
        }
    }

    /// One-based id of the first pool whose blocks hold `size` bytes
    pub fn pool_for(&self, size: usize) -> Option<u8> {
        self.pools
            .iter()
            .position(|pool| size <= pool.block_size())
            .map(pool_id_of)
    }

    /// Takes one more reference to a pooled event. The returned handle is
    /// counted and owns that reference.
    pub fn new_ref(&self, e: &QEvt) -> QEvt {
        q_require!(!e.is_static(), "new reference to static event {}", e.sig());
        self.pool_of(e).retain(e.block());
        QEvt::from_block(e.sig(), e.pool_id(), e.block()).into_counted()
    }

    /// Counts a reference held by a queue; static events are left alone.
    pub fn retain(&self, e: &QEvt) -> u8 {
        if e.is_static() {
            0
        } else {
            self.pool_of(e).retain(e.block())
        }
    }

    /// Collects one reference, recycling the event on the last one.
    pub fn gc(&self, e: QEvt) -> GcOutcome {
        if e.is_static() {
            return GcOutcome::Static;
        }

        let pool = self.pool_of(&e);
        match pool.release(e.block()) {
            Some(left) => GcOutcome::Released(left),
            None => {
                pool.recycle(e.block());
                GcOutcome::Recycled
            }
        }
    }

    /// Releases a reference obtained with [`QEvtPools::new_ref`].
    pub fn delete_ref(&self, e: QEvt) -> GcOutcome {
        q_require!(!e.is_static(), "delete reference to static event {}", e.sig());
        self.gc(e)
    }

    /// Current reference count, 0 for static events
    pub fn ref_ctr(&self, e: &QEvt) -> u8 {
        if e.is_static() {
            0
        } else {
            self.pool_of(e).ref_ctr(e.block())
        }
    }

    /// Shared access to the payload of a pooled event.
    pub fn payload(&self, e: &QEvt) -> Option<RwLockReadGuard<'_, Option<P>>> {
        if e.is_static() {
            None
        } else {
            Some(self.pool_of(e).read(e.block()))
        }
    }

    /// Free blocks in pool `pool_id` (one-based)
    pub fn n_free(&self, pool_id: u8) -> u16 {
        self.pool(pool_id).n_free()
    }

    /// Low-water mark of pool `pool_id` (one-based)
    pub fn pool_min(&self, pool_id: u8) -> u16 {
        self.pool(pool_id).n_min()
    }

    /// Counters of pool `pool_id` (one-based)
    pub fn stats(&self, pool_id: u8) -> QPoolStats {
        self.pool(pool_id).stats()
    }

    fn pool(&self, pool_id: u8) -> &QMPool<P> {
        q_require!(
            pool_id > 0 && usize::from(pool_id) <= self.pools.len(),
            "pool id {} outside 1..={}",
            pool_id,
            self.pools.len()
        );
        &self.pools[usize::from(pool_id - 1)]
    }

    fn pool_of(&self, e: &QEvt) -> &QMPool<P> {
        self.pool(e.pool_id())
    }
}

impl<P> core::fmt::Debug for QEvtPools<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QEvtPools")
            .field("pools", &self.pools)
            .field("max_pools", &self.max_pools)
            .finish()
    }
}

fn pool_id_of(idx: usize) -> u8 {
    // bounded by MAX_EPOOL_LIMIT
    (idx + 1) as u8
}
