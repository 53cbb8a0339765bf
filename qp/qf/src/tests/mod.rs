use alloc::sync::Arc;
use alloc::vec::Vec;
use std::sync::Mutex;

use crate::*;

const SIG_A: QSignal = QSignal(10);
const SIG_B: QSignal = QSignal(11);

fn framework() -> Arc<QF<u32>> {
    QF::new(
        QfConfig::builder()
            .max_active(8)
            .max_pub_signal(16)
            .max_tick_rate(2)
            .max_time_evts(4)
            .event_pool(4, 8)
            .build(),
    )
}

/// Port recording the priorities it was signalled for
#[derive(Default)]
struct RecordingPort {
    signalled: Mutex<Vec<u8>>,
    locks: Mutex<Vec<u8>>,
}

impl QPort for RecordingPort {
    fn queue_signal(&self, prio: u8) {
        self.signalled.lock().unwrap().push(prio);
    }

    fn sched_lock(&self, ceiling: u8) -> SchedStatus {
        self.locks.lock().unwrap().push(ceiling);
        SchedStatus::Locked { prev: 0 }
    }
}

#[test]
fn test_add_and_remove() {
    let qf = framework();
    qf.add(3, 4, 5);
    assert!(qf.is_registered(3));
    assert_eq!(qf.threshold(3), Some(5));
    assert!(!qf.is_registered(4));

    qf.remove(3);
    assert!(!qf.is_registered(3));
    assert_eq!(qf.threshold(3), None);
}

#[test]
#[should_panic(expected = "priority 3 registered twice")]
fn test_duplicate_priority_is_fatal() {
    let qf = framework();
    qf.add(3, 4, 3);
    qf.add(3, 4, 3);
}

#[test]
#[should_panic(expected = "threshold 2 of priority 3")]
fn test_threshold_below_priority_is_fatal() {
    framework().add(3, 4, 2);
}

#[test]
fn test_ready_set_follows_queue() {
    let qf = framework();
    qf.add(2, 4, 2);
    qf.add(6, 4, 6);
    assert!(qf.ready_set().is_empty());

    qf.post(2, QEvt::new_static(SIG_A));
    qf.post(6, QEvt::new_static(SIG_A));
    qf.post(6, QEvt::new_static(SIG_B));
    assert_eq!(qf.ready_set().find_max(), 6);

    assert_eq!(qf.get(6).map(|e| e.sig()), Some(SIG_A));
    assert!(qf.ready_set().has(6));
    assert_eq!(qf.get(6).map(|e| e.sig()), Some(SIG_B));
    assert!(!qf.ready_set().has(6));
    assert_eq!(qf.ready_set().find_max(), 2);
    assert!(qf.get(6).is_none());
}

#[test]
fn test_port_signalled_on_empty_to_non_empty() {
    let qf = framework();
    let port = Arc::new(RecordingPort::default());
    let weak: alloc::sync::Weak<dyn QPort> = Arc::downgrade(&port) as alloc::sync::Weak<RecordingPort>;
    qf.set_port(weak);
    qf.add(4, 4, 4);

    qf.post(4, QEvt::new_static(SIG_A));
    qf.post(4, QEvt::new_static(SIG_B));
    assert_eq!(*port.signalled.lock().unwrap(), [4]);

    while qf.get(4).is_some() {}
    qf.post(4, QEvt::new_static(SIG_A));
    assert_eq!(*port.signalled.lock().unwrap(), [4, 4]);
}

#[test]
fn test_publish_locks_scheduler_at_top_subscriber() {
    let qf = framework();
    let port = Arc::new(RecordingPort::default());
    let weak: alloc::sync::Weak<dyn QPort> = Arc::downgrade(&port) as alloc::sync::Weak<RecordingPort>;
    qf.set_port(weak);
    qf.add(2, 4, 2);
    qf.add(7, 4, 7);
    qf.subscribe(2, SIG_A);
    qf.subscribe(7, SIG_A);

    qf.publish(QEvt::new_static(SIG_A));
    assert_eq!(*port.locks.lock().unwrap(), [7]);
}

#[test]
fn test_post_counts_references() {
    let qf = framework();
    qf.add(1, 4, 1);
    let e = qf.new_evt(SIG_A, 7);
    assert_eq!(qf.pools().ref_ctr(&e), 0);

    qf.post(1, e);
    let e = qf.get(1).unwrap();
    assert_eq!(qf.pools().ref_ctr(&e), 1);
    assert_eq!(qf.with_evt(&e, |evt| evt.payload().copied()), Some(7));
    qf.gc(e);
    assert_eq!(qf.pools().n_free(1), 4);
}

#[test]
fn test_refused_post_returns_event_untouched() {
    let qf = framework();
    qf.add(1, 2, 1);
    qf.post(1, QEvt::new_static(SIG_A));

    let e = qf.new_evt(SIG_B, 1);
    let e = qf.post_x(1, e, Margin::Reserve(1)).unwrap_err();
    assert_eq!(qf.pools().ref_ctr(&e), 0);
    assert_eq!(qf.queue_len(1), 1);
    qf.gc(e);
    assert_eq!(qf.pools().n_free(1), 4);
}

#[test]
fn test_remove_cleans_up() {
    let qf = framework();
    qf.add(5, 4, 5);
    qf.subscribe(5, SIG_A);
    let te = qf.time_evt(5, SIG_B, 0);
    qf.arm(&te, 10, 0);
    qf.post(5, qf.new_evt(SIG_A, 1));
    qf.post(5, qf.new_evt(SIG_A, 2));
    assert_eq!(qf.pools().n_free(1), 2);

    qf.remove(5);
    assert_eq!(qf.pools().n_free(1), 4);
    assert!(qf.subscribers(SIG_A).is_empty());
    assert!(!qf.ready_set().has(5));
    assert!(qf.no_time_evts_active(0));
    qf.delete_time_evt(te);
}

#[test]
#[should_panic(expected = "stale time event handle")]
fn test_time_evt_of_removed_owner_is_stale() {
    let qf = framework();
    qf.add(5, 4, 5);
    let te = qf.time_evt(5, SIG_B, 0);
    qf.remove(5);
    qf.arm(&te, 1, 0);
}

#[test]
fn test_time_evt_slot_reused_after_delete() {
    let qf = framework();
    let handles: Vec<QTimeEvt> = (0..4).map(|_| qf.time_evt(1, SIG_A, 0)).collect();
    let mut handles = handles.into_iter();
    let first = handles.next().unwrap();
    qf.delete_time_evt(first);

    let again = qf.time_evt(1, SIG_B, 1);
    assert_eq!(again.sig(), SIG_B);
    assert_eq!(again.rate(), 1);
    assert_eq!(qf.curr_ctr(&again), 0);
}

#[test]
#[should_panic(expected = "time event arena of 4 exhausted")]
fn test_time_evt_arena_exhaustion_is_fatal() {
    let qf = framework();
    let _handles: Vec<QTimeEvt> = (0..5).map(|_| qf.time_evt(1, SIG_A, 0)).collect();
}

#[test]
fn test_trace_hook_sees_posts() {
    let qf = framework();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    qf.set_trace_hook(Arc::new(move |record: &QsRecord| {
        sink.lock().unwrap().push(*record);
    }));
    qf.add(3, 4, 3);
    qf.post(3, QEvt::new_static(SIG_A));
    let _ = qf.get(3);
    qf.clear_trace_hook();
    qf.post(3, QEvt::new_static(SIG_B));

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        [
            QsRecord::PostFifo { prio: 3, sig: SIG_A, n_free: 3, n_min: 3 },
            QsRecord::GetLast { prio: 3, sig: SIG_A },
        ]
    );
}

#[test]
fn test_delete_of_last_reference_traces_recycling() {
    let qf = framework();
    qf.add(3, 4, 3);
    qf.post(3, qf.new_evt(SIG_A, 5));
    let e = qf.get(3).unwrap();
    let kept = qf.new_ref(&e);
    qf.gc(e);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    qf.set_trace_hook(Arc::new(move |record: &QsRecord| {
        sink.lock().unwrap().push(*record);
    }));
    qf.delete_ref(kept);

    assert_eq!(
        *seen.lock().unwrap(),
        [
            QsRecord::DeleteRef { sig: SIG_A, pool_id: 1, ref_ctr: 1 },
            QsRecord::Gc { sig: SIG_A, pool_id: 1 },
            QsRecord::MpoolPut { pool_id: 1, n_free: 4 },
        ]
    );
}

#[test]
fn test_armed_time_evt_slot_reused_without_tick() {
    let qf = framework();
    let mut handles: Vec<QTimeEvt> = (0..4).map(|_| qf.time_evt(1, SIG_A, 1)).collect();
    let armed = handles.remove(0);
    qf.arm(&armed, 100, 0);
    qf.delete_time_evt(armed);

    let again = qf.time_evt(1, SIG_B, 1);
    assert_eq!(qf.curr_ctr(&again), 0);
    assert!(qf.no_time_evts_active(1));
    assert_eq!(qf.tick_ctr(1), 0);
}
