//! QP Framework POSIX Port
//!
//! Runs every active object on its own OS thread, named `ao-<prio>`. A
//! thread blocks on a per-priority condition variable while its queue is
//! empty; the framework wakes it through [`QPort::queue_signal`] when a post
//! makes the queue non-empty. The queue get is the only suspension point.
//!
//! Each thread asks the host for `SCHED_FIFO` at a priority that mirrors
//! its framework priority (see [`ThreadPolicy`]). Without the privilege to
//! do so it stays at the default policy.
//!
//! # Example
//!
//! ```no_run
//! use qp_posix::{ClockTick, PosixKernel};
//! use qp_qf::{QF, QfConfig};
//!
//! let kernel = PosixKernel::<u32>::new(QF::new(QfConfig::builder().build()));
//! // kernel.start(prio, queue_len, Box::new(my_ao), None)?;
//! kernel.start_ticker(0, ClockTick::new(100))?;
//! kernel.run()?;
//! # Ok::<(), qp_posix::PosixError>(())
//! ```

mod error;
mod sched;
mod time;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, trace};
use parking_lot::{Condvar, Mutex};
use qp_core::{q_require, QEvt};
use qp_qf::{ActiveObject, QActive, QPort, QF};

pub use error::PosixError;
pub use sched::ThreadPolicy;
pub use time::{ClockTick, MAX_TICK_HZ};

/// Wakes the thread of one priority
#[derive(Debug, Default)]
struct Wakeup {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Wakeup {
    fn notify(&self) {
        *self.pending.lock() = true;
        self.cond.notify_one();
    }

    /// Blocks until notified or the framework stops.
    fn wait<P>(&self, qf: &QF<P>) {
        let mut pending = self.pending.lock();
        while !*pending && !qf.is_stopped() {
            self.cond.wait(&mut pending);
        }
        *pending = false;
    }
}

/// Thread-per-active-object kernel
pub struct PosixKernel<P> {
    qf: Arc<QF<P>>,
    /// Indexed by priority - 1
    wakeups: Vec<Arc<Wakeup>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    /// Policy each object thread got, indexed by priority - 1
    policies: Arc<Mutex<Vec<Option<ThreadPolicy>>>>,
    /// Bit `n` set while rate `n` has a ticker thread
    tickers: Mutex<u16>,
}

impl<P: Send + Sync + 'static> PosixKernel<P> {
    /// Create a kernel driving `qf` and install it as its scheduler port
    pub fn new(qf: Arc<QF<P>>) -> Arc<Self> {
        let max_active = usize::from(qf.config().max_active);
        let wakeups = (0..max_active).map(|_| Arc::new(Wakeup::default())).collect();
        let kernel = Arc::new(Self {
            qf: Arc::clone(&qf),
            wakeups,
            threads: Mutex::new(Vec::new()),
            policies: Arc::new(Mutex::new(vec![None; max_active])),
            tickers: Mutex::new(0),
        });
        let port: Arc<dyn QPort> = kernel.clone();
        qf.set_port(Arc::downgrade(&port));
        kernel
    }

    pub fn qf(&self) -> &Arc<QF<P>> {
        &self.qf
    }

    /// Scheduling policy the thread of `prio` runs under, once it is up.
    pub fn policy(&self, prio: u8) -> Option<ThreadPolicy> {
        let idx = usize::from(prio).checked_sub(1)?;
        self.policies.lock().get(idx).copied().flatten()
    }

    /// Registers `ao` at `prio`, runs its top-most initial transition in the
    /// calling thread, then spawns its event thread at the real-time
    /// priority mirroring `prio`.
    pub fn start(&self, prio: u8, queue_len: u16, ao: Box<dyn QActive<P>>, par: Option<QEvt>) -> Result<(), PosixError> {
        self.qf.add(prio, queue_len, prio);
        let mut obj = ActiveObject::new(Arc::clone(&self.qf), prio, ao);
        obj.init(par);

        let name = format!("ao-{prio}");
        let qf = Arc::clone(&self.qf);
        let wakeup = Arc::clone(&self.wakeups[usize::from(prio - 1)]);
        let policies = Arc::clone(&self.policies);
        let priority = sched::ao_priority(prio, self.qf.config().max_active);
        let thread_name = name.clone();
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let policy = sched::apply(&thread_name, priority);
            policies.lock()[usize::from(prio - 1)] = Some(policy);
            event_loop(obj, &qf, &wakeup);
        });

        match spawned {
            Ok(handle) => {
                debug!("{}: priority {} started on {}", self.qf.config().name, prio, name);
                self.threads.lock().push(handle);
                Ok(())
            }
            Err(source) => {
                error!("{}: cannot spawn {}: {}", self.qf.config().name, name, source);
                self.qf.remove(prio);
                Err(PosixError::Spawn { name, source })
            }
        }
    }

    /// Spawns a thread ticking `rate` at `clock` until the framework stops.
    /// Each rate takes at most one ticker.
    pub fn start_ticker(&self, rate: u8, clock: ClockTick) -> Result<(), PosixError> {
        q_require!(
            rate < self.qf.config().max_tick_rate,
            "tick rate {} not below {}",
            rate,
            self.qf.config().max_tick_rate
        );

        let mut tickers = self.tickers.lock();
        let bit = 1u16 << rate;
        if *tickers & bit != 0 {
            return Err(PosixError::TickerRunning(rate));
        }

        let name = format!("tick-{rate}");
        let thread_name = name.clone();
        let qf = Arc::clone(&self.qf);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                sched::apply(&thread_name, sched::tick_priority());
                time::tick_loop(&qf, rate, clock.period());
            })
            .map_err(|source| PosixError::Spawn { name, source })?;
        *tickers |= bit;
        self.threads.lock().push(handle);
        Ok(())
    }

    /// Installs a Ctrl-C handler that stops the framework, then joins every
    /// thread.
    pub fn run(&self) -> Result<(), PosixError> {
        let qf = Arc::clone(&self.qf);
        ctrlc::set_handler(move || {
            debug!("{}: interrupted", qf.config().name);
            qf.stop();
        })?;
        self.join()
    }
}

impl<P> PosixKernel<P> {
    /// Joins every spawned thread. Returns once the framework is stopped
    /// and all active objects and tickers have wound down.
    pub fn join(&self) -> Result<(), PosixError> {
        let handles: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        let mut result = Ok(());
        for handle in handles {
            let name = handle.thread().name().unwrap_or("unnamed").to_owned();
            if handle.join().is_err() {
                error!("{}: thread {} panicked", self.qf.config().name, name);
                result = Err(PosixError::ThreadPanicked(name));
            }
        }
        result
    }
}

/// Event thread body
///
/// Dispatches until the object asks to stop, which deregisters it, or the
/// framework stops.
fn event_loop<P>(mut obj: ActiveObject<P>, qf: &QF<P>, wakeup: &Wakeup) {
    let prio = obj.prio();
    while !qf.is_stopped() {
        match qf.get(prio) {
            Some(e) => {
                trace!("step of priority {}", prio);
                obj.dispatch(e);
                if obj.stop_requested() {
                    qf.remove(prio);
                    debug!("{}: priority {} stopped", qf.config().name, prio);
                    return;
                }
            }
            None => wakeup.wait(qf),
        }
    }
    debug!("{}: priority {} exits on framework stop", qf.config().name, prio);
}

impl<P> QPort for PosixKernel<P>
where
    P: Send + Sync,
{
    fn queue_signal(&self, prio: u8) {
        if let Some(wakeup) = usize::from(prio).checked_sub(1).and_then(|idx| self.wakeups.get(idx)) {
            wakeup.notify();
        }
    }

    fn on_stop(&self) {
        for wakeup in &self.wakeups {
            wakeup.notify();
        }
    }
}

impl<P> std::fmt::Debug for PosixKernel<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosixKernel")
            .field("threads", &self.threads.lock().len())
            .field("tickers", &format_args!("{:#06b}", *self.tickers.lock()))
            .finish()
    }
}
