//! Event queue implementation for active objects
//!
//! A bounded queue of event handles made of a front slot plus a ring. The
//! front slot holds the next event to be taken, which lets the owner tell an
//! empty queue from a non-empty one with a single check. The queue does not
//! touch reference counters; callers account for the references it holds.

use alloc::collections::VecDeque;

use qp_core::{q_error, q_require, Margin, QEvt};

/// Bounded FIFO/LIFO queue of event handles
#[derive(Debug)]
pub struct QEQueue {
    front: Option<QEvt>,
    ring: VecDeque<QEvt>,
    capacity: u16,
    n_free: u16,
    n_min: u16,
}

impl QEQueue {
    /// Create a queue holding at most `capacity` events
    pub fn new(capacity: u16) -> Self {
        q_require!(capacity > 0, "event queue needs room for one event");
        Self {
            front: None,
            ring: VecDeque::with_capacity(usize::from(capacity - 1)),
            capacity,
            n_free: capacity,
            n_min: capacity,
        }
    }

    /// Post an event to the back of the queue (FIFO).
    ///
    /// Succeeds only if `margin` admits the current number of free slots;
    /// otherwise the event is handed back. Overflow under
    /// [`Margin::Strict`] is a contract violation.
    pub fn post(&mut self, e: QEvt, margin: Margin) -> Result<(), QEvt> {
        if !margin.admits(self.n_free) {
            if margin.is_strict() {
                q_error!("event queue of {} overflowed by {}", self.capacity, e.sig());
            }
            return Err(e);
        }

        self.take_slot();
        if self.front.is_none() {
            self.front = Some(e);
        } else {
            self.ring.push_back(e);
        }
        Ok(())
    }

    /// Post an event to the front of the queue (LIFO). A full queue is fatal.
    pub fn post_lifo(&mut self, e: QEvt) {
        if self.n_free == 0 {
            q_error!("event queue of {} overflowed by {}", self.capacity, e.sig());
        }

        self.take_slot();
        if let Some(prev) = self.front.replace(e) {
            self.ring.push_front(prev);
        }
    }

    /// Get the next event from the queue
    pub fn get(&mut self) -> Option<QEvt> {
        let e = self.front.take()?;
        self.front = self.ring.pop_front();
        self.n_free += 1;
        Some(e)
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.front.is_none()
    }

    /// Get the number of events in the queue
    pub fn len(&self) -> usize {
        usize::from(self.capacity - self.n_free)
    }

    /// Get the maximum capacity of the queue
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Number of free slots
    pub fn n_free(&self) -> u16 {
        self.n_free
    }

    /// Lowest number of free slots ever observed
    pub fn n_min(&self) -> u16 {
        self.n_min
    }

    /// Signal of the event that [`get`](QEQueue::get) would return
    pub fn peek_sig(&self) -> Option<qp_core::QSignal> {
        self.front.as_ref().map(QEvt::sig)
    }

    fn take_slot(&mut self) {
        self.n_free -= 1;
        if self.n_free < self.n_min {
            self.n_min = self.n_free;
        }
    }
}
