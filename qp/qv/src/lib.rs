#![no_std]
#![forbid(unsafe_code)]

//! # QV Cooperative Kernel
//!
//! The vanilla (cooperative) kernel providing run-to-completion semantics
//! with priority-based event dispatching. No preemption occurs between
//! events: every step runs the highest-priority active object with a
//! non-empty queue for exactly one event, then the kernel looks again.
//!
//! Interrupt-level code may post and publish through the shared [`QF`];
//! it never dispatches.

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, trace};
use qp_core::{q_error, q_require, QEvt, QsRecord};
use qp_qf::{ActiveObject, QActive, QF};

/// Idle callback
pub type OnIdle = Box<dyn FnMut() + Send>;

/// QV kernel - cooperative scheduler
pub struct QvKernel<P> {
    qf: Arc<QF<P>>,
    /// Started active objects, indexed by priority - 1
    objects: Vec<Option<ActiveObject<P>>>,
    on_idle: Option<OnIdle>,
    /// Priority of the last step, 0 after going idle
    last: u8,
}

impl<P> QvKernel<P> {
    /// Create a kernel driving `qf`
    pub fn new(qf: Arc<QF<P>>) -> Self {
        let objects = (0..qf.config().max_active).map(|_| None).collect();
        Self {
            qf,
            objects,
            on_idle: None,
            last: 0,
        }
    }

    /// Installs the callback [`run`](QvKernel::run) invokes whenever no
    /// active object is ready.
    pub fn with_idle(mut self, on_idle: impl FnMut() + Send + 'static) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    pub fn qf(&self) -> &Arc<QF<P>> {
        &self.qf
    }

    /// Registers `ao` at `prio` and runs its top-most initial transition in
    /// the caller's context. `par` is recycled afterwards.
    pub fn start(&mut self, prio: u8, queue_len: u16, ao: Box<dyn QActive<P>>, par: Option<QEvt>) {
        self.qf.add(prio, queue_len, prio);
        let mut obj = ActiveObject::new(self.qf.clone(), prio, ao);
        obj.init(par);
        self.objects[usize::from(prio - 1)] = Some(obj);
        debug!("{}: priority {} started", self.qf.config().name, prio);
    }

    /// Whether an active object is started at `prio`
    pub fn is_started(&self, prio: u8) -> bool {
        usize::from(prio)
            .checked_sub(1)
            .and_then(|idx| self.objects.get(idx))
            .is_some_and(Option::is_some)
    }

    /// Performs one run-to-completion step. Returns `false` when nothing
    /// was ready.
    pub fn run_once(&mut self) -> bool {
        let prio = self.qf.ready_set().find_max();
        if prio == 0 {
            if self.last != 0 {
                let prev = self.last;
                self.qf.emit(|| QsRecord::SchedIdle { prev });
                self.last = 0;
            }
            return false;
        }

        if prio != self.last {
            let prev = self.last;
            self.qf.emit(|| QsRecord::SchedNext { next: prio, prev });
            self.last = prio;
        }

        let idx = usize::from(prio - 1);
        q_require!(self.objects[idx].is_some(), "priority {} is ready but not started", prio);
        let Some(e) = self.qf.get(prio) else {
            return false;
        };
        let Some(obj) = self.objects[idx].as_mut() else {
            q_error!("priority {} vanished during its step", prio)
        };
        trace!("step of priority {}", prio);
        obj.dispatch(e);

        if obj.stop_requested() {
            self.objects[idx] = None;
            self.qf.remove(prio);
            debug!("{}: priority {} stopped", self.qf.config().name, prio);
        }
        true
    }

    /// Runs steps until no active object is ready. Returns the step count.
    pub fn run_until_idle(&mut self) -> usize {
        let mut steps = 0;
        while self.run_once() {
            steps += 1;
        }
        steps
    }

    /// Runs the scheduler until [`QF::stop`] is called.
    pub fn run(&mut self) {
        debug!("{}: QV running", self.qf.config().name);
        while !self.qf.is_stopped() {
            if !self.run_once() {
                match self.on_idle.as_mut() {
                    Some(on_idle) => on_idle(),
                    None => core::hint::spin_loop(),
                }
            }
        }
        debug!("{}: QV stopped", self.qf.config().name);
    }
}

impl<P> core::fmt::Debug for QvKernel<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let started: Vec<u8> = self
            .objects
            .iter()
            .filter_map(|obj| obj.as_ref().map(ActiveObject::prio))
            .collect();
        f.debug_struct("QvKernel").field("started", &started).finish()
    }
}

#[cfg(feature = "defmt")]
impl<P> defmt::Format for QvKernel<P> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QV{{stopped: {}}}", self.qf.is_stopped());
    }
}
