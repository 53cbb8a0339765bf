//! Active object trait and base implementation
//!
//! An active object is a state machine plus a priority, a queue registered
//! with the framework and an [`ActiveContext`] through which its handlers
//! reach the framework. Kernels drive active objects only through
//! [`ActiveObject`], which pairs the boxed machine with its context and
//! takes care of payload views, tracing and garbage collection.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace};
use qp_core::{Evt, Margin, QEvt, QSignal, QsRecord};
use qp_qep::{QDispatch, QStateMachine};

use crate::queue::QEQueue;
use crate::time::QTimeEvt;
use crate::QF;

/// Object-safe interface kernels use to run an active object.
///
/// Every [`QStateMachine`] whose context is [`ActiveContext`] implements it.
pub trait QActive<P>: Send {
    /// Top-most initial transition
    fn init(&mut self, par: Option<&Evt<'_, P>>, ctx: &ActiveContext<P>);

    /// One run-to-completion step
    fn dispatch(&mut self, e: &Evt<'_, P>, ctx: &ActiveContext<P>) -> QDispatch;
}

impl<P, M> QActive<P> for M
where
    M: QStateMachine<Payload = P, Context = ActiveContext<P>> + Send,
{
    fn init(&mut self, par: Option<&Evt<'_, P>>, ctx: &ActiveContext<P>) {
        QStateMachine::init(self, par, ctx);
    }

    fn dispatch(&mut self, e: &Evt<'_, P>, ctx: &ActiveContext<P>) -> QDispatch {
        QStateMachine::dispatch(self, e, ctx)
    }
}

/// Framework access for the handlers of one active object.
pub struct ActiveContext<P> {
    qf: Arc<QF<P>>,
    prio: u8,
    stop: AtomicBool,
}

impl<P> ActiveContext<P> {
    pub fn new(qf: Arc<QF<P>>, prio: u8) -> Self {
        Self {
            qf,
            prio,
            stop: AtomicBool::new(false),
        }
    }

    /// Priority of the active object
    pub fn prio(&self) -> u8 {
        self.prio
    }

    /// The framework the object is registered with
    pub fn qf(&self) -> &Arc<QF<P>> {
        &self.qf
    }

    /// Posts `e` FIFO to this object's own queue.
    pub fn post_self(&self, e: QEvt) {
        self.qf.post(self.prio, e);
    }

    pub fn post(&self, to: u8, e: QEvt) {
        self.qf.post(to, e);
    }

    pub fn post_x(&self, to: u8, e: QEvt, margin: Margin) -> Result<(), QEvt> {
        self.qf.post_x(to, e, margin)
    }

    pub fn post_lifo(&self, to: u8, e: QEvt) {
        self.qf.post_lifo(to, e);
    }

    pub fn publish(&self, e: QEvt) {
        self.qf.publish(e);
    }

    pub fn subscribe(&self, sig: QSignal) {
        self.qf.subscribe(self.prio, sig);
    }

    pub fn unsubscribe(&self, sig: QSignal) {
        self.qf.unsubscribe(self.prio, sig);
    }

    pub fn unsubscribe_all(&self) {
        self.qf.unsubscribe_all(self.prio);
    }

    /// Allocates a dynamic event; running out is fatal.
    pub fn new_evt(&self, sig: QSignal, payload: P) -> QEvt {
        self.qf.new_evt(sig, payload)
    }

    pub fn new_evt_x(&self, sig: QSignal, payload: P, margin: Margin) -> Option<QEvt> {
        self.qf.new_evt_x(sig, payload, margin)
    }

    /// Keeps the event being handled alive past the current step.
    ///
    /// The handle owns the new reference: posting or publishing it passes
    /// the reference on, [`ActiveContext::delete_ref`] drops it.
    pub fn new_ref(&self, e: &Evt<'_, P>) -> QEvt {
        self.qf.new_ref(e.handle())
    }

    pub fn delete_ref(&self, e: QEvt) {
        self.qf.delete_ref(e);
    }

    /// Posts the event being handled on to `to`.
    pub fn forward(&self, to: u8, e: &Evt<'_, P>) {
        match e.handle().try_clone_static() {
            Some(copy) => self.qf.post(to, copy),
            None => self.qf.post(to, self.new_ref(e)),
        }
    }

    /// Creates a time event posting `sig` to this object at `rate`.
    pub fn time_evt(&self, sig: QSignal, rate: u8) -> QTimeEvt {
        self.qf.time_evt(self.prio, sig, rate)
    }

    pub fn arm(&self, te: &QTimeEvt, n_ticks: u32, interval: u32) {
        self.qf.arm(te, n_ticks, interval);
    }

    pub fn disarm(&self, te: &QTimeEvt) -> bool {
        self.qf.disarm(te)
    }

    pub fn rearm(&self, te: &QTimeEvt, n_ticks: u32) -> bool {
        self.qf.rearm(te, n_ticks)
    }

    pub fn was_disarmed(&self, te: &QTimeEvt) -> bool {
        self.qf.was_disarmed(te)
    }

    /// Sets the event being handled aside in `eq`.
    pub fn defer(&self, eq: &mut QEQueue, e: &Evt<'_, P>) -> bool {
        let deferred = self.qf.defer(eq, e.handle());
        if deferred {
            self.qf.emit(|| QsRecord::Defer {
                prio: self.prio,
                sig: e.sig(),
            });
        }
        deferred
    }

    /// Moves the oldest event deferred in `eq` to the front of this
    /// object's queue.
    pub fn recall(&self, eq: &mut QEQueue) -> bool {
        self.qf.recall(self.prio, eq)
    }

    /// Asks the kernel to deregister this object once the current step ends.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl<P> fmt::Debug for ActiveContext<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveContext")
            .field("prio", &self.prio)
            .field("stop", &self.stop_requested())
            .finish()
    }
}

/// A started active object as kernels hold it.
pub struct ActiveObject<P> {
    ao: Box<dyn QActive<P>>,
    ctx: ActiveContext<P>,
}

impl<P> ActiveObject<P> {
    /// Pairs `ao` with a context for `prio`. The priority must already be
    /// registered with `qf`.
    pub fn new(qf: Arc<QF<P>>, prio: u8, ao: Box<dyn QActive<P>>) -> Self {
        Self {
            ao,
            ctx: ActiveContext::new(qf, prio),
        }
    }

    pub fn prio(&self) -> u8 {
        self.ctx.prio
    }

    pub fn context(&self) -> &ActiveContext<P> {
        &self.ctx
    }

    /// Runs the top-most initial transition, then recycles `par`.
    pub fn init(&mut self, par: Option<QEvt>) {
        let qf = &self.ctx.qf;
        match par {
            Some(par) => {
                qf.with_evt(&par, |e| self.ao.init(Some(e), &self.ctx));
                qf.gc(par);
            }
            None => self.ao.init(None, &self.ctx),
        }
        qf.emit(|| QsRecord::InitTran { prio: self.ctx.prio });
        debug!("priority {} initialized", self.ctx.prio);
    }

    /// Dispatches `e` and garbage-collects it.
    pub fn dispatch(&mut self, e: QEvt) -> QDispatch {
        let qf = &self.ctx.qf;
        let (prio, sig) = (self.ctx.prio, e.sig());
        qf.emit(|| QsRecord::Dispatch { prio, sig });

        let outcome = qf.with_evt(&e, |evt| self.ao.dispatch(evt, &self.ctx));
        match outcome {
            QDispatch::Transitioned => qf.emit(|| QsRecord::Tran { prio, sig }),
            QDispatch::Handled => qf.emit(|| QsRecord::InternTran { prio, sig }),
            QDispatch::Ignored => qf.emit(|| QsRecord::Ignored { prio, sig }),
        }
        trace!("priority {} dispatched {}: {:?}", prio, sig, outcome);

        qf.gc(e);
        outcome
    }

    /// Whether a handler asked for this object to be stopped
    pub fn stop_requested(&self) -> bool {
        self.ctx.stop_requested()
    }
}

impl<P> fmt::Debug for ActiveObject<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveObject").field("ctx", &self.ctx).finish()
    }
}
