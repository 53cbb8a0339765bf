//! Active object registry, posting and the ready set
//!
//! The registry holds one slot per priority. A slot owns the queue of the
//! active object registered there and its preemption threshold. Posting
//! goes through the registry so that the enqueue, the reference count of a
//! pooled event and the ready set change together in one critical section.

use log::{debug, trace, warn};
use qp_core::{q_error, q_require, Margin, QEvt, QPSet, QsRecord};

use crate::framework::Slot;
use crate::queue::QEQueue;
use crate::time;
use crate::QF;

/// Result of handing an event to a slot
pub(crate) enum Enqueue {
    Done,
    /// The queue could not honour the margin; the event is handed back
    Refused(QEvt),
    /// Nothing is registered at the target priority
    Vacant(QEvt),
}

enum Admission {
    Queued { was_empty: bool, n_free: u16, n_min: u16 },
    Refused(QEvt, u16),
    Vacant(QEvt),
}

impl<P> QF<P> {
    /// Registers an active object at `prio` with a queue of `queue_len`
    /// events and preemption threshold `threshold`.
    ///
    /// Registering a taken priority is fatal.
    pub fn add(&self, prio: u8, queue_len: u16, threshold: u8) {
        let max_active = self.config().max_active;
        q_require!(
            prio > 0 && prio <= max_active,
            "priority {} outside 1..={}",
            prio,
            max_active
        );
        q_require!(
            threshold >= prio && threshold <= max_active,
            "threshold {} of priority {} outside {}..={}",
            threshold,
            prio,
            prio,
            max_active
        );

        self.with_state(|st| {
            let slot = &mut st.slots[usize::from(prio - 1)];
            q_require!(slot.is_none(), "priority {} registered twice", prio);
            *slot = Some(Slot {
                queue: QEQueue::new(queue_len),
                threshold,
            });
        });
        debug!("{}: priority {} registered, queue of {}", self.config().name, prio, queue_len);
    }

    /// Deregisters `prio`.
    ///
    /// Drops its subscriptions, retires its time events and recycles the
    /// events left in its queue.
    pub fn remove(&self, prio: u8) {
        let slot = self.with_state(|st| {
            let taken = usize::from(prio)
                .checked_sub(1)
                .and_then(|idx| st.slots.get_mut(idx))
                .and_then(Option::take);
            let Some(slot) = taken else {
                q_error!("priority {} is not registered", prio)
            };

            st.ready.remove(prio);
            for set in st.subscribers.iter_mut() {
                set.remove(prio);
            }
            for id in 0..st.time_evts.len() {
                if st.time_evts[id].owned_by(prio) {
                    // arena length is a u16
                    time::retire(st, id as u16);
                }
            }
            slot
        });

        let mut queue = slot.queue;
        let mut recycled = 0usize;
        while let Some(e) = queue.get() {
            self.gc(e);
            recycled += 1;
        }
        debug!(
            "{}: priority {} removed, {} queued events recycled",
            self.config().name,
            prio,
            recycled
        );
    }

    /// Whether an active object is registered at `prio`
    pub fn is_registered(&self, prio: u8) -> bool {
        self.with_state(|st| st.slot(prio).is_some())
    }

    /// Preemption threshold of `prio`, `None` when not registered
    pub fn threshold(&self, prio: u8) -> Option<u8> {
        self.with_state(|st| st.slot(prio).map(|slot| slot.threshold))
    }

    /// Posts `e` FIFO to `to`. A full queue is fatal.
    pub fn post(&self, to: u8, e: QEvt) {
        if let Err(e) = self.post_x(to, e, Margin::Strict) {
            q_error!("post of {} to priority {} refused", e.sig(), to)
        }
    }

    /// Posts `e` FIFO to `to` if at least `margin` free slots would remain.
    ///
    /// On refusal the event comes back untouched.
    pub fn post_x(&self, to: u8, e: QEvt, margin: Margin) -> Result<(), QEvt> {
        match self.enqueue(to, e, margin, false, true) {
            Enqueue::Done => Ok(()),
            Enqueue::Refused(e) => Err(e),
            Enqueue::Vacant(e) => q_error!("post of {} to unregistered priority {}", e.sig(), to),
        }
    }

    /// Posts `e` to the front of the queue of `to`. A full queue is fatal.
    pub fn post_lifo(&self, to: u8, e: QEvt) {
        if let Enqueue::Vacant(e) = self.enqueue(to, e, Margin::Strict, true, true) {
            q_error!("post of {} to unregistered priority {}", e.sig(), to)
        }
    }

    /// Hands `e` to the queue of `to`.
    ///
    /// With `count_ref` the queue takes its own reference to a pooled event
    /// unless the handle is already counted. Otherwise the caller's
    /// reference moves into the queue.
    pub(crate) fn enqueue(&self, to: u8, e: QEvt, margin: Margin, lifo: bool, count_ref: bool) -> Enqueue {
        let sig = e.sig();
        let admission = self.with_state(|st| {
            let Some(slot) = st.slot_mut(to) else {
                return Admission::Vacant(e);
            };
            let queue = &mut slot.queue;
            if !lifo && !margin.admits(queue.n_free()) {
                if margin.is_strict() {
                    q_error!("queue of priority {} overflowed by {}", to, sig);
                }
                return Admission::Refused(e, queue.n_free());
            }

            if count_ref && !e.is_counted() {
                self.pools().retain(&e);
            }
            let was_empty = queue.is_empty();
            if lifo {
                queue.post_lifo(e);
            } else if let Err(e) = queue.post(e, Margin::Strict) {
                q_error!("queue of priority {} overflowed by {}", to, e.sig());
            }
            let (n_free, n_min) = (queue.n_free(), queue.n_min());
            if was_empty {
                st.ready.insert(to);
            }
            Admission::Queued { was_empty, n_free, n_min }
        });

        match admission {
            Admission::Queued { was_empty, n_free, n_min } => {
                trace!("{} posted to priority {}", sig, to);
                if lifo {
                    self.emit(|| QsRecord::PostLifo { prio: to, sig, n_free, n_min });
                } else {
                    self.emit(|| QsRecord::PostFifo { prio: to, sig, n_free, n_min });
                }
                if was_empty {
                    self.signal_port(to);
                }
                Enqueue::Done
            }
            Admission::Refused(e, n_free) => {
                warn!("post of {} to priority {} refused at {}", sig, to, margin);
                let margin = match margin {
                    Margin::Strict => 0,
                    Margin::Reserve(m) => m,
                };
                self.emit(|| QsRecord::PostAttempt { prio: to, sig, n_free, margin });
                Enqueue::Refused(e)
            }
            Admission::Vacant(e) => Enqueue::Vacant(e),
        }
    }

    /// Takes the next event from the queue of `prio`.
    ///
    /// Clears the ready bit of `prio` when the queue drains.
    pub fn get(&self, prio: u8) -> Option<QEvt> {
        let (e, n_free, last) = self.with_state(|st| {
            let slot = st.slot_mut(prio)?;
            let taken = slot.queue.get();
            let n_free = slot.queue.n_free();
            let last = slot.queue.is_empty();
            if last {
                st.ready.remove(prio);
            }
            taken.map(|e| (e, n_free, last))
        })?;

        let sig = e.sig();
        if last {
            self.emit(|| QsRecord::GetLast { prio, sig });
        } else {
            self.emit(|| QsRecord::Get { prio, sig, n_free });
        }
        Some(e)
    }

    /// Lowest number of free queue slots `prio` has seen
    pub fn queue_min(&self, prio: u8) -> Option<u16> {
        self.with_state(|st| st.slot(prio).map(|slot| slot.queue.n_min()))
    }

    /// Number of events waiting for `prio`
    pub fn queue_len(&self, prio: u8) -> usize {
        self.with_state(|st| st.slot(prio).map_or(0, |slot| slot.queue.len()))
    }

    /// Priorities with a non-empty queue
    pub fn ready_set(&self) -> QPSet {
        self.with_state(|st| st.ready)
    }
}
