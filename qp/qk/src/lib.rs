#![no_std]
#![forbid(unsafe_code)]

//! QK - Preemptive Priority-Based Kernel
//!
//! This module implements the QK preemptive kernel, which provides
//! deterministic, priority-based preemptive scheduling for active objects on
//! a single stack. Preemption is synchronous: a post that makes an active
//! object above the running one ready activates it right away, nested on the
//! poster's stack, and the poster resumes once every such activation has run
//! to completion.
//!
//! Key features:
//! - Preemption-threshold scheduling: an active object only yields to
//!   priorities above its threshold
//! - Priority-ceiling scheduler locking, used by publish-subscribe
//! - Interrupt brackets that defer scheduling to the interrupt exit
//!
//! QK assumes a single core: posts come from one thread of control plus the
//! interrupt code it brackets with [`QkKernel::isr_entry`] and
//! [`QkKernel::isr_exit`].

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, trace};
use qp_core::{q_assert, q_error, q_require, QEvt, QsRecord};
use qp_qf::{ActiveObject, QActive, QPort, SchedStatus, QF};
use spin::Mutex;

/// Idle callback
pub type OnIdle = Box<dyn FnMut() + Send>;

/// Scheduler attributes
#[derive(Debug, Clone, Copy, Default)]
struct SchedState {
    /// Priority of the running active object, 0 when idle
    act_prio: u8,
    /// Preemption threshold of the running active object
    act_thre: u8,
    /// Scheduler lock ceiling
    lock_ceil: u8,
    /// Priority chosen by the last scheduling decision, 0 for none
    next_prio: u8,
    /// Interrupt nesting level
    int_nest: u8,
}

/// The QK preemptive kernel
///
/// Created with [`QkKernel::new`], which installs the kernel as the
/// scheduler port of the framework. The scheduler stays locked until
/// [`QkKernel::run`], so active objects started beforehand only run once
/// the kernel does.
pub struct QkKernel<P> {
    qf: Arc<QF<P>>,
    sched: Mutex<SchedState>,
    /// Started active objects, indexed by priority - 1
    objects: Vec<Mutex<Option<ActiveObject<P>>>>,
    on_idle: Mutex<Option<OnIdle>>,
}

impl<P: Send + Sync + 'static> QkKernel<P> {
    /// Create a kernel driving `qf` and install it as its scheduler port
    pub fn new(qf: Arc<QF<P>>) -> Arc<Self> {
        let max_active = qf.config().max_active;
        let kernel = Arc::new(Self {
            qf: qf.clone(),
            sched: Mutex::new(SchedState {
                lock_ceil: max_active,
                ..SchedState::default()
            }),
            objects: (0..max_active).map(|_| Mutex::new(None)).collect(),
            on_idle: Mutex::new(None),
        });
        let port: Arc<dyn QPort> = kernel.clone();
        qf.set_port(Arc::downgrade(&port));
        kernel
    }
}

impl<P> QkKernel<P> {
    pub fn qf(&self) -> &Arc<QF<P>> {
        &self.qf
    }

    /// Installs the callback [`run`](QkKernel::run) invokes while idle.
    pub fn set_idle(&self, on_idle: impl FnMut() + Send + 'static) {
        *self.on_idle.lock() = Some(Box::new(on_idle));
    }

    /// Priority of the running active object, 0 when idle
    pub fn act_prio(&self) -> u8 {
        self.sched.lock().act_prio
    }

    /// Current scheduler lock ceiling
    pub fn lock_ceiling(&self) -> u8 {
        self.sched.lock().lock_ceil
    }

    /// Whether the caller runs inside an interrupt bracket
    pub fn in_isr(&self) -> bool {
        self.sched.lock().int_nest != 0
    }

    /// Registers `ao` at `prio` with preemption threshold `threshold` and
    /// runs its top-most initial transition in the caller's context.
    ///
    /// `par` is recycled afterwards. Events the object posts to itself
    /// during initialization are dispatched once the start completes.
    pub fn start(&self, prio: u8, queue_len: u16, threshold: u8, ao: Box<dyn QActive<P>>, par: Option<QEvt>) {
        self.qf.add(prio, queue_len, threshold);
        let mut obj = ActiveObject::new(self.qf.clone(), prio, ao);

        let status = self.lock(prio);
        obj.init(par);
        *self.objects[usize::from(prio - 1)].lock() = Some(obj);
        debug!("{}: priority {} started, threshold {}", self.qf.config().name, prio, threshold);
        self.unlock(status);
    }

    /// Marks entry into interrupt-level code.
    pub fn isr_entry(&self) {
        self.sched.lock().int_nest += 1;
    }

    /// Marks exit from interrupt-level code and schedules on the last exit.
    pub fn isr_exit(&self) {
        let outermost = {
            let mut st = self.sched.lock();
            q_require!(st.int_nest > 0, "interrupt exit without entry");
            st.int_nest -= 1;
            st.int_nest == 0
        };
        if outermost {
            self.schedule();
        }
    }

    /// Unlocks the scheduler, drains all ready work and idles until
    /// [`QF::stop`].
    pub fn run(&self) {
        debug!("{}: QK running", self.qf.config().name);
        self.sched.lock().lock_ceil = 0;
        self.schedule();

        while !self.qf.is_stopped() {
            match self.on_idle.lock().as_mut() {
                Some(on_idle) => on_idle(),
                None => core::hint::spin_loop(),
            }
            self.schedule();
        }
        debug!("{}: QK stopped", self.qf.config().name);
    }

    fn lock(&self, ceiling: u8) -> SchedStatus {
        let mut st = self.sched.lock();
        if st.int_nest != 0 || st.lock_ceil >= ceiling {
            return SchedStatus::Unchanged;
        }
        let prev = st.lock_ceil;
        st.lock_ceil = ceiling;
        drop(st);
        self.qf.emit(|| QsRecord::SchedLock { prev, ceiling });
        SchedStatus::Locked { prev }
    }

    fn unlock(&self, status: SchedStatus) {
        let SchedStatus::Locked { prev } = status else {
            return;
        };
        let ceiling = {
            let mut st = self.sched.lock();
            q_require!(
                st.lock_ceil > prev,
                "scheduler unlock to {} above ceiling {}",
                prev,
                st.lock_ceil
            );
            core::mem::replace(&mut st.lock_ceil, prev)
        };
        self.qf.emit(|| QsRecord::SchedUnlock { prev: ceiling, ceiling: prev });
        self.schedule();
    }

    /// Highest ready priority allowed to preempt `thre`, 0 when none
    fn candidate(&self, thre: u8) -> u8 {
        let ready = self.qf.ready_set().find_max();
        let mut st = self.sched.lock();
        st.next_prio = if ready > thre && ready > st.lock_ceil { ready } else { 0 };
        st.next_prio
    }

    fn schedule(&self) {
        let (thre, in_isr) = {
            let st = self.sched.lock();
            (st.act_thre, st.int_nest != 0)
        };
        if !in_isr && self.candidate(thre) != 0 {
            self.activate();
        }
    }

    /// Runs every ready active object above the threshold in force on
    /// entry, highest first, then restores the preempted context.
    fn activate(&self) {
        let (prio_in, thre_in) = {
            let st = self.sched.lock();
            (st.act_prio, st.act_thre)
        };

        let mut prev = prio_in;
        loop {
            let prio = self.candidate(thre_in);
            if prio == 0 {
                break;
            }
            let thre = self.qf.threshold(prio).unwrap_or(prio);
            {
                let mut st = self.sched.lock();
                st.act_prio = prio;
                st.act_thre = thre;
                st.next_prio = 0;
            }
            if prio != prev {
                self.qf.emit(|| QsRecord::SchedNext { next: prio, prev });
            }
            prev = prio;
            self.step(prio);
        }

        {
            let mut st = self.sched.lock();
            st.act_prio = prio_in;
            st.act_thre = thre_in;
        }
        if prio_in != 0 {
            self.qf.emit(|| QsRecord::SchedResume { prio: prio_in, prev });
        } else {
            self.qf.emit(|| QsRecord::SchedIdle { prev });
        }
    }

    fn step(&self, prio: u8) {
        let mut slot = self.objects[usize::from(prio - 1)].lock();
        q_assert!(slot.is_some(), "priority {} is ready but not started", prio);
        let Some(e) = self.qf.get(prio) else {
            return;
        };
        let Some(obj) = slot.as_mut() else {
            q_error!("priority {} vanished during its step", prio)
        };

        trace!("step of priority {}", prio);
        obj.dispatch(e);
        if obj.stop_requested() {
            *slot = None;
            drop(slot);
            self.qf.remove(prio);
            debug!("{}: priority {} stopped", self.qf.config().name, prio);
        }
    }
}

impl<P> QPort for QkKernel<P>
where
    P: Send + Sync,
{
    fn queue_signal(&self, _prio: u8) {
        self.schedule();
    }

    fn sched_lock(&self, ceiling: u8) -> SchedStatus {
        self.lock(ceiling)
    }

    fn sched_unlock(&self, status: SchedStatus) {
        self.unlock(status);
    }
}

impl<P> core::fmt::Debug for QkKernel<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QkKernel")
            .field("sched", &*self.sched.lock())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<P> defmt::Format for QkKernel<P> {
    fn format(&self, fmt: defmt::Formatter) {
        let st = *self.sched.lock();
        defmt::write!(
            fmt,
            "QK{{act_prio: {}, act_thre: {}, lock_ceil: {}}}",
            st.act_prio,
            st.act_thre,
            st.lock_ceil
        );
    }
}
