//! Cooperative kernel tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use qp_qf::*;
use qp_qv::QvKernel;

const SIG_S: QSignal = QSignal(4);
const SIG_TIMEOUT: QSignal = QSignal(5);
const SIG_DONE: QSignal = QSignal(6);

type Log = Arc<Mutex<Vec<(u8, QSignal, Option<u16>)>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Top,
    Idle,
    Busy,
}

/// Subscribes to `SIG_S` and forwards `SIG_DONE` to a peer on every
/// `SIG_S`. A `SIG_TIMEOUT` one-shot moves it from `Busy` back to `Idle`;
/// `SIG_DONE` stops it.
struct Worker {
    hsm: QHsm<State>,
    log: Log,
    peer: Option<u8>,
    timeout: Option<QTimeEvt>,
}

impl Worker {
    fn new(log: &Log, peer: Option<u8>) -> Box<Self> {
        Box::new(Self {
            hsm: QHsm::new(),
            log: log.clone(),
            peer,
            timeout: None,
        })
    }

    fn record(&self, ctx: &ActiveContext<u16>, sig: QSignal, payload: Option<u16>) {
        self.log.lock().unwrap().push((ctx.prio(), sig, payload));
    }
}

impl QStateMachine for Worker {
    type State = State;
    type Payload = u16;
    type Context = ActiveContext<u16>;

    const TOP: State = State::Top;

    fn hsm(&self) -> &QHsm<State> {
        &self.hsm
    }

    fn hsm_mut(&mut self) -> &mut QHsm<State> {
        &mut self.hsm
    }

    fn initial(&mut self, par: Option<&Evt<'_, u16>>, ctx: &ActiveContext<u16>) -> QStateReturn<State> {
        if let Some(par) = par {
            self.record(ctx, par.sig(), par.payload().copied());
        }
        self.timeout = Some(ctx.time_evt(SIG_TIMEOUT, 0));
        ctx.subscribe(SIG_S);
        QStateReturn::Tran(State::Idle)
    }

    fn handle(&mut self, state: State, e: &Evt<'_, u16>, ctx: &ActiveContext<u16>) -> QStateReturn<State> {
        match (state, e.sig()) {
            (State::Idle, SIG_S) => {
                self.record(ctx, e.sig(), e.payload().copied());
                if let Some(peer) = self.peer {
                    ctx.post(peer, QEvt::new_static(SIG_DONE));
                }
                QStateReturn::Tran(State::Busy)
            }
            (State::Idle, SIG_DONE) => {
                self.record(ctx, e.sig(), None);
                ctx.stop();
                QStateReturn::Handled
            }
            (State::Idle, _) => QStateReturn::Super(State::Top),
            (State::Busy, QSignal::ENTRY) => {
                if let Some(te) = &self.timeout {
                    ctx.arm(te, 2, 0);
                }
                QStateReturn::Handled
            }
            (State::Busy, SIG_TIMEOUT) => {
                self.record(ctx, e.sig(), None);
                QStateReturn::Tran(State::Idle)
            }
            (State::Busy, _) => QStateReturn::Super(State::Top),
            (State::Top, _) => QStateReturn::Ignored,
        }
    }
}

fn kernel() -> QvKernel<u16> {
    QvKernel::new(QF::new(
        QfConfig::builder()
            .name("qv-test")
            .max_active(12)
            .max_pub_signal(8)
            .event_pool(6, 2)
            .build(),
    ))
}

#[test]
fn test_publish_runs_higher_priority_subscriber_first() {
    let log = Log::default();
    let mut qv = kernel();
    qv.start(5, 4, Worker::new(&log, None), None);
    qv.start(9, 4, Worker::new(&log, None), None);
    let qf = qv.qf().clone();

    qf.publish(qf.new_evt(SIG_S, 77));
    assert_eq!(qv.run_until_idle(), 2);
    assert_eq!(
        *log.lock().unwrap(),
        [(9, SIG_S, Some(77)), (5, SIG_S, Some(77))]
    );
    assert_eq!(qf.pools().n_free(1), 6);
}

#[test]
fn test_run_once_reports_idle() {
    let log = Log::default();
    let mut qv = kernel();
    assert!(!qv.run_once());
    qv.start(1, 4, Worker::new(&log, None), None);
    assert!(!qv.run_once());

    qv.qf().post(1, QEvt::new_static(SIG_S));
    assert!(qv.run_once());
    assert!(!qv.run_once());
}

#[test]
fn test_time_event_drives_state_machine() {
    let log = Log::default();
    let mut qv = kernel();
    qv.start(3, 4, Worker::new(&log, None), None);
    let qf = qv.qf().clone();

    qf.post(3, QEvt::new_static(SIG_S));
    qv.run_until_idle();
    qf.tick(0);
    assert_eq!(qv.run_until_idle(), 0);
    qf.tick(0);
    assert_eq!(qv.run_until_idle(), 1);

    assert_eq!(*log.lock().unwrap(), [(3, SIG_S, None), (3, SIG_TIMEOUT, None)]);
    assert!(qf.no_time_evts_active(0));
}

#[test]
fn test_initial_parameter_is_recycled() {
    let log = Log::default();
    let mut qv = kernel();
    let par = qv.qf().new_evt(SIG_S, 31);
    assert_eq!(qv.qf().pools().n_free(1), 5);

    qv.start(2, 4, Worker::new(&log, None), Some(par));
    assert_eq!(qv.qf().pools().n_free(1), 6);
    assert_eq!(*log.lock().unwrap(), [(2, SIG_S, Some(31))]);
}

#[test]
fn test_stop_deregisters_between_steps() {
    let log = Log::default();
    let mut qv = kernel();
    qv.start(2, 4, Worker::new(&log, None), None);
    qv.start(7, 4, Worker::new(&log, Some(2)), None);
    let qf = qv.qf().clone();

    qf.post(7, QEvt::new_static(SIG_S));
    assert_eq!(qv.run_until_idle(), 2);

    assert!(!qv.is_started(2));
    assert!(!qf.is_registered(2));
    assert!(qv.is_started(7));
    assert!(!qf.subscribers(SIG_S).has(2));
    assert_eq!(
        *log.lock().unwrap(),
        [(7, SIG_S, None), (2, SIG_DONE, None)]
    );
}

#[test]
fn test_run_returns_after_stop_from_idle() {
    let idle_calls = Arc::new(AtomicUsize::new(0));
    let log = Log::default();
    let qv = kernel();
    let qf = qv.qf().clone();
    let calls = idle_calls.clone();
    let mut qv = qv.with_idle(move || {
        if calls.fetch_add(1, Ordering::SeqCst) == 2 {
            qf.stop();
        }
    });
    qv.start(4, 4, Worker::new(&log, None), None);
    qv.qf().post(4, QEvt::new_static(SIG_S));

    qv.run();
    assert_eq!(idle_calls.load(Ordering::SeqCst), 3);
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn test_sched_records() {
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = records.clone();
    let log = Log::default();
    let mut qv = kernel();
    qv.qf().set_trace_hook(Arc::new(move |record: &QsRecord| {
        if matches!(record, QsRecord::SchedNext { .. } | QsRecord::SchedIdle { .. }) {
            sink.lock().unwrap().push(*record);
        }
    }));
    qv.start(3, 4, Worker::new(&log, None), None);
    qv.start(6, 4, Worker::new(&log, None), None);

    qv.qf().publish(QEvt::new_static(SIG_S));
    qv.run_until_idle();
    assert_eq!(
        *records.lock().unwrap(),
        [
            QsRecord::SchedNext { next: 6, prev: 0 },
            QsRecord::SchedNext { next: 3, prev: 6 },
            QsRecord::SchedIdle { prev: 3 },
        ]
    );
}

#[test]
#[should_panic(expected = "priority 5 registered twice")]
fn test_duplicate_start_is_fatal() {
    let log = Log::default();
    let mut qv = kernel();
    qv.start(5, 4, Worker::new(&log, None), None);
    qv.start(5, 4, Worker::new(&log, None), None);
}
