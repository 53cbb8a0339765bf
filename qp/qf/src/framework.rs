//! The framework instance shared by kernels and active objects.

use alloc::sync::{Arc, Weak};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::mem::size_of;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use log::{debug, trace};
use qp_core::{q_error, Evt, Margin, QEvt, QPSet, QSignal, QsRecord, TraceHook};
use qp_mem::{GcOutcome, QEvtPools};
use spin::RwLock;

use crate::config::QfConfig;
use crate::port::QPort;
use crate::queue::QEQueue;
use crate::time::{RateList, TimeEvtEntry};

/// Registry entry of one active object
pub(crate) struct Slot {
    pub(crate) queue: QEQueue,
    pub(crate) threshold: u8,
}

/// Everything guarded by the framework's critical section
pub(crate) struct FrameworkState {
    pub(crate) slots: Vec<Option<Slot>>,
    pub(crate) ready: QPSet,
    pub(crate) subscribers: Vec<QPSet>,
    pub(crate) time_evts: Vec<TimeEvtEntry>,
    pub(crate) rates: Vec<RateList>,
}

impl FrameworkState {
    pub(crate) fn slot(&self, prio: u8) -> Option<&Slot> {
        let idx = usize::from(prio).checked_sub(1)?;
        self.slots.get(idx)?.as_ref()
    }

    pub(crate) fn slot_mut(&mut self, prio: u8) -> Option<&mut Slot> {
        let idx = usize::from(prio).checked_sub(1)?;
        self.slots.get_mut(idx)?.as_mut()
    }
}

/// Process-wide framework state: event pools, the active-object registry,
/// the ready set, subscriber lists and time events.
///
/// Created once with [`QF::new`] and shared as `Arc<QF<P>>`; `P` is the
/// payload type of dynamic events.
pub struct QF<P> {
    config: QfConfig,
    pools: QEvtPools<P>,
    pub(crate) state: Mutex<RefCell<FrameworkState>>,
    stopped: AtomicBool,
    port: RwLock<Option<Weak<dyn QPort>>>,
    trace_hook: RwLock<Option<TraceHook>>,
}

impl<P> QF<P> {
    /// Builds a framework instance and its event pools.
    pub fn new(config: QfConfig) -> Arc<Self> {
        config.validate();

        let mut pools = QEvtPools::new(config.max_epool);
        for &(n_blocks, block_size) in &config.event_pools {
            pools.pool_init(n_blocks, block_size);
        }

        let state = FrameworkState {
            slots: (0..config.max_active).map(|_| None).collect(),
            ready: QPSet::new(),
            subscribers: vec![QPSet::new(); usize::from(config.max_pub_signal)],
            time_evts: vec![TimeEvtEntry::VACANT; usize::from(config.max_time_evts)],
            rates: vec![RateList::default(); usize::from(config.max_tick_rate)],
        };

        debug!(
            "{}: framework up, {} priorities, {} event pools",
            config.name,
            config.max_active,
            pools.len()
        );

        Arc::new(Self {
            config,
            pools,
            state: Mutex::new(RefCell::new(state)),
            stopped: AtomicBool::new(false),
            port: RwLock::new(None),
            trace_hook: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &QfConfig {
        &self.config
    }

    /// The event pool set
    pub fn pools(&self) -> &QEvtPools<P> {
        &self.pools
    }

    /// Installs the scheduler port of the kernel driving this framework.
    pub fn set_port(&self, port: Weak<dyn QPort>) {
        *self.port.write() = Some(port);
    }

    /// Removes the scheduler port.
    pub fn clear_port(&self) {
        *self.port.write() = None;
    }

    pub(crate) fn port(&self) -> Option<Arc<dyn QPort>> {
        self.port.read().as_ref().and_then(Weak::upgrade)
    }

    /// Installs the software-tracing hook.
    pub fn set_trace_hook(&self, hook: TraceHook) {
        *self.trace_hook.write() = Some(hook);
    }

    /// Removes the software-tracing hook.
    pub fn clear_trace_hook(&self) {
        *self.trace_hook.write() = None;
    }

    /// Hands a record to the tracing hook, if one is installed.
    pub fn emit(&self, record: impl FnOnce() -> QsRecord) {
        let hook = self.trace_hook.read().clone();
        if let Some(hook) = hook {
            hook(&record());
        }
    }

    /// Requests every kernel loop to wind down.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!("{}: stop requested", self.config.name);
            if let Some(port) = self.port() {
                port.on_stop();
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut FrameworkState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    pub(crate) fn signal_port(&self, prio: u8) {
        if let Some(port) = self.port() {
            port.queue_signal(prio);
        }
    }

    /// Allocates a dynamic event; running out of blocks is fatal.
    pub fn new_evt(&self, sig: QSignal, payload: P) -> QEvt {
        match self.new_evt_x(sig, payload, Margin::Strict) {
            Some(e) => e,
            None => q_error!("no block for {}", sig),
        }
    }

    /// Allocates a dynamic event unless the pool cannot honour `margin`.
    pub fn new_evt_x(&self, sig: QSignal, payload: P, margin: Margin) -> Option<QEvt> {
        let size = size_of::<P>().max(1);
        match self.pools.new_evt_x(size, sig, payload, margin) {
            Some(e) => {
                let pool_id = e.pool_id();
                self.emit(|| QsRecord::MpoolGet {
                    pool_id,
                    n_free: self.pools.n_free(pool_id),
                    n_min: self.pools.pool_min(pool_id),
                });
                self.emit(|| QsRecord::New {
                    sig,
                    size: u16::try_from(size).unwrap_or(u16::MAX),
                });
                Some(e)
            }
            None => {
                if let (Some(pool_id), Margin::Reserve(margin)) = (self.pools.pool_for(size), margin) {
                    self.emit(|| QsRecord::MpoolGetAttempt {
                        pool_id,
                        n_free: self.pools.n_free(pool_id),
                        margin,
                    });
                }
                None
            }
        }
    }

    /// Takes one more counted reference to a pooled event.
    pub fn new_ref(&self, e: &QEvt) -> QEvt {
        let dup = self.pools.new_ref(e);
        self.emit(|| QsRecord::NewRef {
            sig: e.sig(),
            pool_id: e.pool_id(),
            ref_ctr: self.pools.ref_ctr(e),
        });
        dup
    }

    /// Drops one reference, recycling the event on the last one.
    pub fn gc(&self, e: QEvt) {
        let (sig, pool_id) = (e.sig(), e.pool_id());
        let outcome = self.pools.gc(e);
        self.trace_gc(sig, pool_id, outcome);
    }

    /// Releases a reference taken with [`QF::new_ref`].
    pub fn delete_ref(&self, e: QEvt) {
        let (sig, pool_id) = (e.sig(), e.pool_id());
        let ref_ctr = self.pools.ref_ctr(&e);
        self.emit(|| QsRecord::DeleteRef { sig, pool_id, ref_ctr });
        let outcome = self.pools.delete_ref(e);
        self.trace_gc(sig, pool_id, outcome);
    }

    fn trace_gc(&self, sig: QSignal, pool_id: u8, outcome: GcOutcome) {
        match outcome {
            GcOutcome::Static => {}
            GcOutcome::Released(ref_ctr) => {
                self.emit(|| QsRecord::GcAttempt { sig, pool_id, ref_ctr });
            }
            GcOutcome::Recycled => {
                trace!("{} recycled to pool {}", sig, pool_id);
                self.emit(|| QsRecord::Gc { sig, pool_id });
                self.emit(|| QsRecord::MpoolPut {
                    pool_id,
                    n_free: self.pools.n_free(pool_id),
                });
            }
        }
    }

    /// Runs `f` on the handler view of `e`, payload included.
    pub fn with_evt<R>(&self, e: &QEvt, f: impl FnOnce(&Evt<'_, P>) -> R) -> R {
        let guard = self.pools.payload(e);
        let payload = guard.as_deref().and_then(Option::as_ref);
        f(&Evt::new(e, payload))
    }
}

impl<P> Drop for QF<P> {
    fn drop(&mut self) {
        debug!("{}: framework torn down", self.config.name);
    }
}

/// Second handle to the same event, not counted.
///
/// Only valid when the caller makes the receiving queue count it.
pub(crate) fn alias(e: &QEvt) -> QEvt {
    if e.is_static() {
        QEvt::new_static(e.sig())
    } else {
        QEvt::from_block(e.sig(), e.pool_id(), e.block())
    }
}
