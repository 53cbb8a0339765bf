//! Event deferral
//!
//! An active object can set an event aside in a [`QEQueue`] it owns and
//! recall it later. The deferral queue holds its own reference to a pooled
//! event, which recalling moves into the active object's queue.

use qp_core::{q_error, Margin, QEvt, QsRecord};

use crate::queue::QEQueue;
use crate::registry::Enqueue;
use crate::QF;

impl<P> QF<P> {
    /// Saves a reference to `e` in `eq`. Returns `false` when `eq` is full.
    pub fn defer(&self, eq: &mut QEQueue, e: &QEvt) -> bool {
        if !Margin::Reserve(0).admits(eq.n_free()) {
            return false;
        }
        let kept = match e.try_clone_static() {
            Some(kept) => kept,
            None => self.new_ref(e),
        };
        match eq.post(kept, Margin::Reserve(0)) {
            Ok(()) => true,
            Err(kept) => {
                self.gc(kept);
                false
            }
        }
    }

    /// Moves the oldest event deferred in `eq` to the front of the queue
    /// of `prio`. Returns `false` when `eq` is empty.
    pub fn recall(&self, prio: u8, eq: &mut QEQueue) -> bool {
        let Some(e) = eq.get() else {
            self.emit(|| QsRecord::RecallAttempt { prio });
            return false;
        };

        let sig = e.sig();
        if let Enqueue::Vacant(e) = self.enqueue(prio, e, Margin::Strict, true, false) {
            q_error!("recall of {} to unregistered priority {}", e.sig(), prio)
        }
        self.emit(|| QsRecord::Recall { prio, sig });
        true
    }

    /// Recycles everything deferred in `eq`. Returns how many events went.
    pub fn flush_deferred(&self, eq: &mut QEQueue) -> usize {
        let mut flushed = 0;
        while let Some(e) = eq.get() {
            self.gc(e);
            flushed += 1;
        }
        flushed
    }
}
