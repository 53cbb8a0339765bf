//! Active object tests for qp-qf
//!
//! Active objects here are driven by a minimal run loop: take the highest
//! ready priority, get one event, dispatch it.

use std::sync::{Arc, Mutex, Weak};

use proptest::prelude::*;
use qp_qf::*;

const SIG_S: QSignal = QSignal(5);
const SIG_T: QSignal = QSignal(6);
const SIG_TICK: QSignal = QSignal(7);
const SIG_DEFER: QSignal = QSignal(8);
const SIG_RECALL: QSignal = QSignal(9);
const SIG_STOP: QSignal = QSignal(10);
const SIG_FWD: QSignal = QSignal(11);

type Log = Arc<Mutex<Vec<(u8, u16, Option<u32>)>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecState {
    Top,
    Listening,
}

/// Logs every user event it receives. Defers `SIG_DEFER` until the first
/// `SIG_RECALL` and stops itself on `SIG_STOP`.
struct Recorder {
    hsm: QHsm<RecState>,
    log: Log,
    topics: Vec<QSignal>,
    deferred: QEQueue,
    deferring: bool,
}

impl Recorder {
    fn new(log: &Log, topics: &[QSignal]) -> Self {
        Self {
            hsm: QHsm::new(),
            log: log.clone(),
            topics: topics.to_vec(),
            deferred: QEQueue::new(2),
            deferring: true,
        }
    }
}

impl QStateMachine for Recorder {
    type State = RecState;
    type Payload = u32;
    type Context = ActiveContext<u32>;

    const TOP: RecState = RecState::Top;

    fn hsm(&self) -> &QHsm<RecState> {
        &self.hsm
    }

    fn hsm_mut(&mut self) -> &mut QHsm<RecState> {
        &mut self.hsm
    }

    fn initial(&mut self, _par: Option<&Evt<'_, u32>>, ctx: &ActiveContext<u32>) -> QStateReturn<RecState> {
        for &sig in &self.topics {
            ctx.subscribe(sig);
        }
        QStateReturn::Tran(RecState::Listening)
    }

    fn handle(&mut self, state: RecState, e: &Evt<'_, u32>, ctx: &ActiveContext<u32>) -> QStateReturn<RecState> {
        if state != RecState::Listening || e.sig().is_reserved() {
            return QStateReturn::Super(RecState::Top);
        }
        match e.sig() {
            SIG_DEFER if self.deferring => {
                assert!(ctx.defer(&mut self.deferred, e));
            }
            SIG_RECALL => {
                self.deferring = false;
                ctx.recall(&mut self.deferred);
            }
            SIG_STOP => ctx.stop(),
            sig => {
                self.log
                    .lock()
                    .unwrap()
                    .push((ctx.prio(), sig.raw(), e.payload().copied()));
            }
        }
        QStateReturn::Handled
    }
}

/// How a `Relay` passes on the event it handles
#[derive(Clone, Copy)]
enum Relay {
    PostRef(u8),
    Forward(u8),
    PublishRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayState {
    Top,
    Relaying,
}

struct Relayer {
    hsm: QHsm<RelayState>,
    relay: Relay,
}

impl Relayer {
    fn new(relay: Relay) -> Self {
        Self {
            hsm: QHsm::new(),
            relay,
        }
    }
}

impl QStateMachine for Relayer {
    type State = RelayState;
    type Payload = u32;
    type Context = ActiveContext<u32>;

    const TOP: RelayState = RelayState::Top;

    fn hsm(&self) -> &QHsm<RelayState> {
        &self.hsm
    }

    fn hsm_mut(&mut self) -> &mut QHsm<RelayState> {
        &mut self.hsm
    }

    fn initial(&mut self, _par: Option<&Evt<'_, u32>>, _ctx: &ActiveContext<u32>) -> QStateReturn<RelayState> {
        QStateReturn::Tran(RelayState::Relaying)
    }

    fn handle(&mut self, state: RelayState, e: &Evt<'_, u32>, ctx: &ActiveContext<u32>) -> QStateReturn<RelayState> {
        match (state, e.sig()) {
            (RelayState::Relaying, SIG_FWD) => {
                match self.relay {
                    Relay::PostRef(to) => ctx.post(to, ctx.new_ref(e)),
                    Relay::Forward(to) => ctx.forward(to, e),
                    Relay::PublishRef => ctx.publish(ctx.new_ref(e)),
                }
                QStateReturn::Handled
            }
            (RelayState::Relaying, _) => QStateReturn::Super(RelayState::Top),
            (RelayState::Top, _) => QStateReturn::Ignored,
        }
    }
}

struct Harness {
    qf: Arc<QF<u32>>,
    objects: Vec<Option<ActiveObject<u32>>>,
}

impl Harness {
    fn new() -> Self {
        let qf = QF::new(
            QfConfig::builder()
                .max_active(16)
                .max_pub_signal(16)
                .event_pool(4, 4)
                .build(),
        );
        Self {
            qf,
            objects: (0..=16).map(|_| None).collect(),
        }
    }

    fn start(&mut self, prio: u8, ao: impl QActive<u32> + 'static) {
        self.qf.add(prio, 8, prio);
        let mut obj = ActiveObject::new(self.qf.clone(), prio, Box::new(ao));
        obj.init(None);
        self.objects[usize::from(prio)] = Some(obj);
    }

    fn run_until_idle(&mut self) -> usize {
        let mut steps = 0;
        loop {
            let prio = self.qf.ready_set().find_max();
            if prio == 0 {
                return steps;
            }
            let e = self.qf.get(prio).unwrap();
            let obj = self.objects[usize::from(prio)].as_mut().unwrap();
            obj.dispatch(e);
            if obj.stop_requested() {
                self.objects[usize::from(prio)] = None;
                self.qf.remove(prio);
            }
            steps += 1;
        }
    }
}

fn entries(log: &Log) -> Vec<(u8, u16, Option<u32>)> {
    log.lock().unwrap().clone()
}

#[test]
fn test_publish_reaches_higher_priority_subscriber_first() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(5, Recorder::new(&log, &[SIG_S]));
    h.start(9, Recorder::new(&log, &[SIG_S]));

    h.qf.publish(h.qf.new_evt(SIG_S, 42));
    assert_eq!(h.qf.pools().n_free(1), 3);
    assert_eq!(h.qf.queue_len(5), 1);
    assert_eq!(h.qf.queue_len(9), 1);

    assert_eq!(h.run_until_idle(), 2);
    assert_eq!(entries(&log), [(9, 5, Some(42)), (5, 5, Some(42))]);
    assert_eq!(h.qf.pools().n_free(1), 4);
}

#[test]
fn test_publish_without_subscribers_recycles() {
    let h = Harness::new();
    h.qf.publish(h.qf.new_evt(SIG_S, 1));
    assert_eq!(h.qf.pools().n_free(1), 4);
    assert_eq!(h.qf.pools().stats(1).min_free_blocks, 3);
}

#[test]
fn test_unsubscribed_object_is_skipped() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(3, Recorder::new(&log, &[SIG_S, SIG_T]));
    h.start(4, Recorder::new(&log, &[SIG_S]));
    h.qf.unsubscribe(3, SIG_S);

    h.qf.publish(QEvt::new_static(SIG_S));
    h.qf.publish(QEvt::new_static(SIG_T));
    h.run_until_idle();
    assert_eq!(entries(&log), [(4, 5, None), (3, 6, None)]);

    h.qf.unsubscribe_all(3);
    assert!(h.qf.subscribers(SIG_T).is_empty());
}

#[test]
fn test_dispatch_order_is_fifo_except_lifo_posts() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(2, Recorder::new(&log, &[]));

    for n in 1..=3 {
        h.qf.post(2, h.qf.new_evt(SIG_T, n));
    }
    h.qf.post_lifo(2, QEvt::new_static(SIG_S));

    h.run_until_idle();
    assert_eq!(
        entries(&log),
        [(2, 5, None), (2, 6, Some(1)), (2, 6, Some(2)), (2, 6, Some(3))]
    );
    assert_eq!(h.qf.pools().n_free(1), 4);
}

#[test]
#[should_panic(expected = "unregistered priority 7")]
fn test_post_to_unregistered_priority_is_fatal() {
    let h = Harness::new();
    h.qf.post(7, QEvt::new_static(SIG_S));
}

#[test]
#[should_panic(expected = "overflowed")]
fn test_strict_post_into_full_queue_is_fatal() {
    let h = Harness::new();
    h.qf.add(1, 1, 1);
    h.qf.post(1, QEvt::new_static(SIG_S));
    h.qf.post(1, QEvt::new_static(SIG_S));
}

#[test]
fn test_one_shot_fires_once_on_third_tick() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(3, Recorder::new(&log, &[]));
    let te = h.qf.time_evt(3, SIG_T, 0);
    h.qf.arm(&te, 3, 0);

    h.qf.tick(0);
    h.qf.tick(0);
    assert_eq!(h.qf.queue_len(3), 0);
    assert_eq!(h.qf.curr_ctr(&te), 1);

    h.qf.tick(0);
    assert_eq!(h.qf.queue_len(3), 1);
    assert_eq!(h.qf.curr_ctr(&te), 0);
    assert!(h.qf.no_time_evts_active(0));

    h.qf.tick(0);
    assert_eq!(h.qf.queue_len(3), 1);
    assert_eq!(h.qf.tick_ctr(0), 4);

    h.run_until_idle();
    assert_eq!(entries(&log), [(3, 6, None)]);
    assert!(!h.qf.rearm(&te, 2));
}

#[test]
fn test_disarm_and_was_disarmed() {
    let h = Harness::new();
    h.qf.add(1, 4, 1);
    let te = h.qf.time_evt(1, SIG_T, 0);

    assert!(!h.qf.disarm(&te));
    assert!(!h.qf.was_disarmed(&te));
    assert!(h.qf.was_disarmed(&te));

    h.qf.arm(&te, 5, 5);
    assert!(!h.qf.no_time_evts_active(0));
    assert!(h.qf.disarm(&te));
    assert!(h.qf.was_disarmed(&te));
    assert!(h.qf.no_time_evts_active(0));

    for _ in 0..10 {
        h.qf.tick(0);
    }
    assert_eq!(h.qf.queue_len(1), 0);

    h.qf.arm(&te, 1, 0);
    h.qf.tick(0);
    assert_eq!(h.qf.queue_len(1), 1);
}

#[test]
fn test_rearm_shifts_phase_of_running_event() {
    let h = Harness::new();
    h.qf.add(1, 8, 1);
    let te = h.qf.time_evt(1, SIG_T, 0);
    h.qf.arm(&te, 2, 4);

    h.qf.tick(0);
    assert!(h.qf.rearm(&te, 3));
    h.qf.tick(0);
    h.qf.tick(0);
    assert_eq!(h.qf.queue_len(1), 0);
    h.qf.tick(0);
    assert_eq!(h.qf.queue_len(1), 1);
    assert_eq!(h.qf.curr_ctr(&te), 4);
}

#[test]
#[should_panic(expected = "armed while running")]
fn test_arming_running_time_event_is_fatal() {
    let h = Harness::new();
    let te = h.qf.time_evt(1, SIG_T, 0);
    h.qf.arm(&te, 2, 0);
    h.qf.arm(&te, 2, 0);
}

/// Arms a time event from inside the tick walk, when the first expiry
/// reaches an empty queue.
struct ArmOnSignal {
    qf: Weak<QF<u32>>,
    te: Mutex<Option<QTimeEvt>>,
}

impl QPort for ArmOnSignal {
    fn queue_signal(&self, _prio: u8) {
        let te = self.te.lock().unwrap().take();
        if let (Some(qf), Some(te)) = (self.qf.upgrade(), te) {
            qf.arm(&te, 1, 0);
        }
    }
}

#[test]
fn test_time_event_armed_mid_tick_counts_in_same_pass() {
    let h = Harness::new();
    h.qf.add(1, 8, 1);
    let first = h.qf.time_evt(1, SIG_S, 0);
    let second = h.qf.time_evt(1, SIG_T, 0);
    let port: Arc<dyn QPort> = Arc::new(ArmOnSignal {
        qf: Arc::downgrade(&h.qf),
        te: Mutex::new(Some(second)),
    });
    h.qf.set_port(Arc::downgrade(&port));

    h.qf.arm(&first, 1, 0);
    h.qf.tick(0);
    assert_eq!(h.qf.queue_len(1), 2);
    assert_eq!(h.qf.get(1).map(|e| e.sig()), Some(SIG_S));
    assert_eq!(h.qf.get(1).map(|e| e.sig()), Some(SIG_T));
}

#[test]
fn test_defer_and_recall_keep_the_event_alive() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(6, Recorder::new(&log, &[]));

    h.qf.post(6, h.qf.new_evt(SIG_DEFER, 11));
    h.run_until_idle();
    assert_eq!(h.qf.pools().n_free(1), 3);

    h.qf.post(6, QEvt::new_static(SIG_RECALL));
    assert_eq!(h.run_until_idle(), 2);
    assert_eq!(h.qf.pools().n_free(1), 4);
    assert_eq!(entries(&log), [(6, 8, Some(11))]);
}

#[test]
fn test_posting_a_new_reference_passes_it_on() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(1, Recorder::new(&log, &[]));
    h.start(2, Relayer::new(Relay::PostRef(1)));

    h.qf.post(2, h.qf.new_evt(SIG_FWD, 7));
    assert_eq!(h.run_until_idle(), 2);
    assert_eq!(entries(&log), [(1, 11, Some(7))]);
    assert_eq!(h.qf.pools().n_free(1), 4);
}

#[test]
fn test_forwarded_event_is_recycled_by_last_consumer() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(1, Recorder::new(&log, &[]));
    h.start(2, Relayer::new(Relay::Forward(1)));

    h.qf.post(2, h.qf.new_evt(SIG_FWD, 8));
    h.qf.post(2, QEvt::new_static(SIG_FWD));
    assert_eq!(h.run_until_idle(), 4);
    assert_eq!(entries(&log), [(1, 11, Some(8)), (1, 11, None)]);
    assert_eq!(h.qf.pools().n_free(1), 4);
}

#[test]
fn test_publishing_a_new_reference_passes_it_on() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(1, Recorder::new(&log, &[SIG_FWD]));
    h.start(3, Recorder::new(&log, &[SIG_FWD]));
    h.start(5, Relayer::new(Relay::PublishRef));

    h.qf.post(5, h.qf.new_evt(SIG_FWD, 9));
    assert_eq!(h.run_until_idle(), 3);
    assert_eq!(entries(&log), [(3, 11, Some(9)), (1, 11, Some(9))]);
    assert_eq!(h.qf.pools().n_free(1), 4);
}

#[test]
fn test_recall_from_empty_queue() {
    let h = Harness::new();
    h.qf.add(2, 4, 2);
    let mut eq = QEQueue::new(2);
    assert!(!h.qf.recall(2, &mut eq));

    assert!(h.qf.defer(&mut eq, &QEvt::new_static(SIG_S)));
    assert!(h.qf.defer(&mut eq, &QEvt::new_static(SIG_T)));
    assert!(!h.qf.defer(&mut eq, &QEvt::new_static(SIG_T)));
    assert_eq!(h.qf.flush_deferred(&mut eq), 2);
}

#[test]
fn test_stop_deregisters_at_step_boundary() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(4, Recorder::new(&log, &[SIG_S]));
    h.qf.post(4, QEvt::new_static(SIG_STOP));
    h.qf.post(4, h.qf.new_evt(SIG_T, 3));

    assert_eq!(h.run_until_idle(), 1);
    assert!(!h.qf.is_registered(4));
    assert!(h.qf.subscribers(SIG_S).is_empty());
    assert_eq!(h.qf.pools().n_free(1), 4);
}

#[test]
fn test_ticker_processes_ticks_at_task_level() {
    let log = Log::default();
    let mut h = Harness::new();
    h.start(1, QTicker::<u32>::new(0));
    h.start(2, Recorder::new(&log, &[]));
    let te = h.qf.time_evt(2, SIG_T, 0);
    h.qf.arm(&te, 2, 0);

    for _ in 0..2 {
        h.qf.post(1, QEvt::new_static(SIG_TICK));
        h.run_until_idle();
    }
    assert_eq!(h.qf.tick_ctr(0), 2);
    assert_eq!(entries(&log), [(2, 6, None)]);
}

proptest! {
    #[test]
    fn prop_periodic_time_event_fires_floor_n_over_interval(interval in 1u32..8, n in 1u32..48) {
        let h = Harness::new();
        h.qf.add(1, 64, 1);
        let te = h.qf.time_evt(1, SIG_T, 0);
        h.qf.arm(&te, interval, interval);

        let mut fired_at = Vec::new();
        for tick in 1..=n {
            h.qf.tick(0);
            if let Some(e) = h.qf.get(1) {
                fired_at.push(tick);
                h.qf.gc(e);
            }
        }

        prop_assert_eq!(fired_at.len() as u32, n / interval);
        for (k, tick) in fired_at.iter().enumerate() {
            prop_assert_eq!(*tick, (k as u32 + 1) * interval);
        }
    }
}
