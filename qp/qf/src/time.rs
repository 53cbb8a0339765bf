//! Time events
//!
//! Time events live in a fixed arena owned by the framework and are addressed
//! by [`QTimeEvt`] handles. Every tick rate keeps two singly linked lists
//! threaded through the arena: the main list walked by [`QF::tick`] and a
//! "freshly armed" list that arming pushes onto. Only `tick` touches the main
//! list; it splices the fresh list onto its end when the walk reaches it, so
//! an event armed while a tick is in progress is still counted in that pass.
//!
//! Disarming only zeroes the counter; the entry is unlinked by the next tick
//! of its rate. Retiring an entry unlinks and frees it at once unless a tick
//! of its rate is in progress, in which case that tick frees it.

use log::{trace, warn};
use qp_core::{q_error, q_require, Margin, QEvt, QSignal, QsRecord};

use crate::framework::FrameworkState;
use crate::registry::Enqueue;
use crate::QF;

/// Handle to a time event in the framework's arena.
///
/// Move-only; give it back with [`QF::delete_time_evt`] when the owner no
/// longer needs it. A handle outlived by its entry (the owner was removed)
/// is stale and every operation on it is fatal.
#[derive(Debug, PartialEq, Eq)]
pub struct QTimeEvt {
    id: u16,
    gen: u16,
    owner: u8,
    sig: QSignal,
    rate: u8,
}

impl QTimeEvt {
    /// Priority of the active object the event is posted to
    pub fn owner(&self) -> u8 {
        self.owner
    }

    /// Signal of the posted event
    pub fn sig(&self) -> QSignal {
        self.sig
    }

    /// Tick rate the event is counted at
    pub fn rate(&self) -> u8 {
        self.rate
    }
}

/// Arena entry behind a [`QTimeEvt`]
#[derive(Debug, Clone)]
pub(crate) struct TimeEvtEntry {
    gen: u16,
    used: bool,
    retired: bool,
    owner: u8,
    sig: QSignal,
    rate: u8,
    ctr: u32,
    interval: u32,
    linked: bool,
    was_disarmed: bool,
    next: Option<u16>,
}

impl TimeEvtEntry {
    pub(crate) const VACANT: Self = Self {
        gen: 0,
        used: false,
        retired: false,
        owner: 0,
        sig: QSignal::EMPTY,
        rate: 0,
        ctr: 0,
        interval: 0,
        linked: false,
        was_disarmed: false,
        next: None,
    };

    pub(crate) fn owned_by(&self, prio: u8) -> bool {
        self.used && !self.retired && self.owner == prio
    }

    fn free(&mut self) {
        *self = Self {
            gen: self.gen.wrapping_add(1),
            ..Self::VACANT
        };
    }
}

/// Per-rate list heads
#[derive(Debug, Clone, Default)]
pub(crate) struct RateList {
    head: Option<u16>,
    act: Option<u16>,
    ctr: u32,
    busy: bool,
}

enum TickStep {
    Done,
    Next,
    Expired { owner: u8, sig: QSignal, one_shot: bool },
}

fn lookup<'a>(evts: &'a mut [TimeEvtEntry], te: &QTimeEvt) -> &'a mut TimeEvtEntry {
    match evts.get_mut(usize::from(te.id)) {
        Some(entry) if entry.used && !entry.retired && entry.gen == te.gen => entry,
        _ => q_error!("stale time event handle for {} of priority {}", te.sig, te.owner),
    }
}

fn link_fresh(entry: &mut TimeEvtEntry, list: &mut RateList, id: u16) {
    if !entry.linked {
        entry.linked = true;
        entry.next = list.act;
        list.act = Some(id);
    }
}

/// Takes entry `id` out of whichever list of `rate` holds it.
fn unlink(st: &mut FrameworkState, rate: usize, id: u16) {
    let after = st.time_evts[usize::from(id)].next.take();
    st.time_evts[usize::from(id)].linked = false;
    let list = &mut st.rates[rate];
    if list.head == Some(id) {
        list.head = after;
    } else if list.act == Some(id) {
        list.act = after;
    } else if let Some(prev) = st.time_evts.iter_mut().find(|entry| entry.next == Some(id)) {
        prev.next = after;
    }
}

/// Stops entry `id` for good and frees it, or leaves it to the tick in
/// progress at its rate.
pub(crate) fn retire(st: &mut FrameworkState, id: u16) {
    let entry = &mut st.time_evts[usize::from(id)];
    entry.ctr = 0;
    entry.retired = true;
    let rate = usize::from(entry.rate);
    if entry.linked && !st.rates[rate].busy {
        unlink(st, rate, id);
    }

    let entry = &mut st.time_evts[usize::from(id)];
    if !entry.linked {
        entry.free();
    }
}

fn next_of(st: &FrameworkState, rate: usize, prev: Option<u16>) -> Option<u16> {
    match prev {
        None => st.rates[rate].head,
        Some(id) => st.time_evts[usize::from(id)].next,
    }
}

fn set_next(st: &mut FrameworkState, rate: usize, prev: Option<u16>, next: Option<u16>) {
    match prev {
        None => st.rates[rate].head = next,
        Some(id) => st.time_evts[usize::from(id)].next = next,
    }
}

/// One entry of the tick walk. `prev` is the cursor: `None` stands for the
/// list head.
fn tick_step(st: &mut FrameworkState, rate: usize, prev: &mut Option<u16>) -> TickStep {
    let id = match next_of(st, rate, *prev) {
        Some(id) => id,
        None => match st.rates[rate].act.take() {
            Some(fresh) => {
                set_next(st, rate, *prev, Some(fresh));
                fresh
            }
            None => return TickStep::Done,
        },
    };

    let entry = &mut st.time_evts[usize::from(id)];
    if entry.ctr == 0 {
        // disarmed since the last tick: unlink, cursor stays
        let after = entry.next.take();
        entry.linked = false;
        if entry.retired {
            entry.free();
        }
        set_next(st, rate, *prev, after);
        return TickStep::Next;
    }

    entry.ctr -= 1;
    if entry.ctr != 0 {
        *prev = Some(id);
        return TickStep::Next;
    }

    let (owner, sig) = (entry.owner, entry.sig);
    if entry.interval != 0 {
        entry.ctr = entry.interval;
        *prev = Some(id);
        TickStep::Expired { owner, sig, one_shot: false }
    } else {
        let after = entry.next.take();
        entry.linked = false;
        set_next(st, rate, *prev, after);
        TickStep::Expired { owner, sig, one_shot: true }
    }
}

impl<P> QF<P> {
    /// Creates a disarmed time event posting `sig` to `owner` at `rate`.
    pub fn time_evt(&self, owner: u8, sig: QSignal, rate: u8) -> QTimeEvt {
        q_require!(!sig.is_reserved(), "time event with reserved signal {}", sig);
        q_require!(
            rate < self.config().max_tick_rate,
            "tick rate {} not below {}",
            rate,
            self.config().max_tick_rate
        );
        q_require!(
            owner > 0 && owner <= self.config().max_active,
            "time event owner {} outside 1..={}",
            owner,
            self.config().max_active
        );

        let capacity = self.config().max_time_evts;
        self.with_state(|st| {
            let Some(id) = st.time_evts.iter().position(|entry| !entry.used) else {
                q_error!("time event arena of {} exhausted", capacity)
            };
            let entry = &mut st.time_evts[id];
            *entry = TimeEvtEntry {
                gen: entry.gen,
                used: true,
                owner,
                sig,
                rate,
                ..TimeEvtEntry::VACANT
            };
            QTimeEvt {
                // arena length is a u16
                id: id as u16,
                gen: entry.gen,
                owner,
                sig,
                rate,
            }
        })
    }

    /// Returns a time event to the arena, disarming it first.
    ///
    /// Handles whose owner has been removed are accepted and ignored.
    pub fn delete_time_evt(&self, te: QTimeEvt) {
        self.with_state(|st| {
            let live = st
                .time_evts
                .get(usize::from(te.id))
                .is_some_and(|entry| entry.used && entry.gen == te.gen && !entry.retired);
            if live {
                retire(st, te.id);
            }
        });
    }

    /// Arms `te` to expire after `n_ticks`, then every `interval` ticks
    /// (0 for a one-shot).
    pub fn arm(&self, te: &QTimeEvt, n_ticks: u32, interval: u32) {
        q_require!(n_ticks != 0, "time event {} armed for 0 ticks", te.sig);
        self.with_state(|st| {
            let entry = lookup(&mut st.time_evts, te);
            q_require!(entry.ctr == 0, "time event {} armed while running", te.sig);
            entry.ctr = n_ticks;
            entry.interval = interval;
            entry.was_disarmed = false;
            link_fresh(entry, &mut st.rates[usize::from(te.rate)], te.id);
        });
        self.emit(|| QsRecord::TimeEvtArm {
            prio: te.owner,
            sig: te.sig,
            ctr: n_ticks,
            interval,
            rate: te.rate,
        });
    }

    /// Stops `te`. Returns whether it was running.
    pub fn disarm(&self, te: &QTimeEvt) -> bool {
        let stopped = self.with_state(|st| {
            let entry = lookup(&mut st.time_evts, te);
            if entry.ctr != 0 {
                let stopped = (entry.ctr, entry.interval);
                entry.ctr = 0;
                entry.was_disarmed = true;
                Some(stopped)
            } else {
                entry.was_disarmed = false;
                None
            }
        });

        match stopped {
            Some((ctr, interval)) => {
                self.emit(|| QsRecord::TimeEvtDisarm {
                    prio: te.owner,
                    sig: te.sig,
                    ctr,
                    interval,
                });
                true
            }
            None => {
                self.emit(|| QsRecord::TimeEvtDisarmAttempt {
                    prio: te.owner,
                    sig: te.sig,
                });
                false
            }
        }
    }

    /// Reloads the counter of `te` with `n_ticks`, keeping its interval.
    ///
    /// Returns whether the event was running. A `false` return means a
    /// one-shot already expired and its event is on its way.
    pub fn rearm(&self, te: &QTimeEvt, n_ticks: u32) -> bool {
        q_require!(n_ticks != 0, "time event {} rearmed for 0 ticks", te.sig);
        let was_armed = self.with_state(|st| {
            let entry = lookup(&mut st.time_evts, te);
            let was_armed = entry.ctr != 0;
            if !was_armed {
                link_fresh(entry, &mut st.rates[usize::from(te.rate)], te.id);
            }
            entry.ctr = n_ticks;
            was_armed
        });
        self.emit(|| QsRecord::TimeEvtRearm {
            prio: te.owner,
            sig: te.sig,
            ctr: n_ticks,
            was_armed,
        });
        was_armed
    }

    /// Whether the last [`disarm`](QF::disarm) stopped a running event.
    ///
    /// Sets the flag as a side effect, so later calls return `true`.
    pub fn was_disarmed(&self, te: &QTimeEvt) -> bool {
        self.with_state(|st| {
            let entry = lookup(&mut st.time_evts, te);
            core::mem::replace(&mut entry.was_disarmed, true)
        })
    }

    /// Ticks left before `te` expires, 0 when disarmed
    pub fn curr_ctr(&self, te: &QTimeEvt) -> u32 {
        self.with_state(|st| lookup(&mut st.time_evts, te).ctr)
    }

    /// Processes one clock tick at `rate`.
    ///
    /// Every expired time event is posted FIFO to its owner, outside the
    /// critical section. Only one caller may tick a given rate at a time.
    pub fn tick(&self, rate: u8) {
        q_require!(
            rate < self.config().max_tick_rate,
            "tick rate {} not below {}",
            rate,
            self.config().max_tick_rate
        );
        let r = usize::from(rate);

        let ctr = self.with_state(|st| {
            let list = &mut st.rates[r];
            q_require!(!list.busy, "tick rate {} entered twice", rate);
            list.busy = true;
            list.ctr = list.ctr.wrapping_add(1);
            list.ctr
        });
        self.emit(|| QsRecord::Tick { rate, ctr });

        let mut prev = None;
        loop {
            match self.with_state(|st| tick_step(st, r, &mut prev)) {
                TickStep::Done => break,
                TickStep::Next => {}
                TickStep::Expired { owner, sig, one_shot } => {
                    if one_shot {
                        self.emit(|| QsRecord::TimeEvtAutoDisarm { prio: owner, sig, rate });
                    }
                    self.emit(|| QsRecord::TimeEvtPost { prio: owner, sig, rate });
                    trace!("time event {} expired for priority {}", sig, owner);
                    if let Enqueue::Vacant(_) =
                        self.enqueue(owner, QEvt::new_static(sig), Margin::Strict, false, true)
                    {
                        warn!("time event {} dropped, priority {} is gone", sig, owner);
                    }
                }
            }
        }

        self.with_state(|st| st.rates[r].busy = false);
    }

    /// True when no time event at `rate` is running
    pub fn no_time_evts_active(&self, rate: u8) -> bool {
        q_require!(
            rate < self.config().max_tick_rate,
            "tick rate {} not below {}",
            rate,
            self.config().max_tick_rate
        );
        self.with_state(|st| {
            !st.time_evts
                .iter()
                .any(|entry| entry.linked && entry.rate == rate && entry.ctr != 0)
        })
    }

    /// Number of ticks processed at `rate`
    pub fn tick_ctr(&self, rate: u8) -> u32 {
        self.with_state(|st| st.rates.get(usize::from(rate)).map_or(0, |list| list.ctr))
    }
}
