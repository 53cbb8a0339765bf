//! Publish-subscribe
//!
//! Every publishable signal owns a [`QPSet`] of subscriber priorities.
//! Publishing multicasts the event to a copy of that set in descending
//! priority order, with the scheduler locked at the highest subscriber so
//! that no subscriber runs before all of them have the event.

use log::{trace, warn};
use qp_core::{q_require, Margin, QEvt, QPSet, QSignal, QsRecord};

use crate::framework::alias;
use crate::port::SchedStatus;
use crate::registry::Enqueue;
use crate::QF;

impl<P> QF<P> {
    fn require_pub_signal(&self, sig: QSignal) {
        q_require!(
            sig >= QSignal::USER && sig.raw() < self.config().max_pub_signal,
            "{} outside the publishable range below {}",
            sig,
            self.config().max_pub_signal
        );
    }

    /// Adds `prio` to the subscribers of `sig`.
    pub fn subscribe(&self, prio: u8, sig: QSignal) {
        self.require_pub_signal(sig);
        self.with_state(|st| {
            q_require!(st.slot(prio).is_some(), "subscriber {} is not registered", prio);
            st.subscribers[usize::from(sig.raw())].insert(prio);
        });
        self.emit(|| QsRecord::Subscribe { prio, sig });
    }

    /// Removes `prio` from the subscribers of `sig`.
    pub fn unsubscribe(&self, prio: u8, sig: QSignal) {
        self.require_pub_signal(sig);
        self.with_state(|st| st.subscribers[usize::from(sig.raw())].remove(prio));
        self.emit(|| QsRecord::Unsubscribe { prio, sig });
    }

    /// Removes `prio` from the subscribers of every signal.
    pub fn unsubscribe_all(&self, prio: u8) {
        let dropped = self.with_state(|st| {
            st.subscribers
                .iter_mut()
                .filter(|set| set.has(prio))
                .map(|set| set.remove(prio))
                .count()
        });
        trace!("priority {} dropped {} subscriptions", prio, dropped);
    }

    /// Current subscribers of `sig`
    pub fn subscribers(&self, sig: QSignal) -> QPSet {
        self.require_pub_signal(sig);
        self.with_state(|st| st.subscribers[usize::from(sig.raw())])
    }

    /// Posts `e` to every subscriber of its signal, highest priority first.
    ///
    /// A pooled event with no subscribers is recycled. Subscribers removed
    /// while the multicast is in progress are skipped. A counted handle
    /// gives up its reference once every subscriber holds its own.
    pub fn publish(&self, e: QEvt) {
        let sig = e.sig();
        self.require_pub_signal(sig);

        let subscribers = self.with_state(|st| {
            if !e.is_counted() {
                self.pools().retain(&e);
            }
            st.subscribers[usize::from(sig.raw())]
        });
        self.emit(|| QsRecord::Publish {
            sig,
            // at most MAX_ACTIVE_LIMIT
            subscribers: subscribers.len() as u8,
        });
        trace!("{} published to {} subscribers", sig, subscribers.len());

        if !subscribers.is_empty() {
            let port = self.port();
            let status = port
                .as_ref()
                .map_or(SchedStatus::Unchanged, |port| port.sched_lock(subscribers.find_max()));

            for prio in subscribers.iter() {
                if let Enqueue::Vacant(_) = self.enqueue(prio, alias(&e), Margin::Strict, false, true) {
                    warn!("subscriber {} of {} went away during publish", prio, sig);
                }
            }

            if let Some(port) = port {
                port.sched_unlock(status);
            }
        }

        self.gc(e);
    }
}
