//! Hierarchical state machine implementation details

use heapless::Vec;
use log::trace;
use qp_core::{q_error, q_require, Evt, QSignal, MAX_NEST_DEPTH};

use crate::transition::tran;
use crate::{QDispatch, QStateMachine, QStateReturn};

/// States along one branch of the hierarchy, innermost first
pub(crate) type Path<S> = Vec<S, MAX_NEST_DEPTH>;

/// Sends a reserved signal to `state`. The top state ignores everything.
pub(crate) fn trig<M>(me: &mut M, state: M::State, sig: QSignal, ctx: &M::Context) -> QStateReturn<M::State>
where
    M: QStateMachine + ?Sized,
{
    if state == M::TOP {
        QStateReturn::Ignored
    } else {
        me.handle(state, &Evt::reserved(sig), ctx)
    }
}

/// Direct superstate of `state`, discovered with the empty probe.
pub(crate) fn superstate<M>(me: &mut M, state: M::State, ctx: &M::Context) -> M::State
where
    M: QStateMachine + ?Sized,
{
    match trig(me, state, QSignal::EMPTY, ctx) {
        QStateReturn::Super(parent) => parent,
        other => q_error!("state {:?} answered {:?} to the superstate probe", state, other),
    }
}

pub(crate) fn enter<M>(me: &mut M, state: M::State, ctx: &M::Context)
where
    M: QStateMachine + ?Sized,
{
    trace!("enter {:?}", state);
    let _ = trig(me, state, QSignal::ENTRY, ctx);
}

pub(crate) fn exit<M>(me: &mut M, state: M::State, ctx: &M::Context)
where
    M: QStateMachine + ?Sized,
{
    trace!("exit {:?}", state);
    let _ = trig(me, state, QSignal::EXIT, ctx);
}

pub(crate) fn push<S: core::fmt::Debug>(path: &mut Path<S>, state: S) {
    if let Err(state) = path.push(state) {
        q_error!("state {:?} nested deeper than {}", state, MAX_NEST_DEPTH);
    }
}

/// Enters every state from just below `from` down to `target`.
fn enter_from<M>(me: &mut M, from: M::State, target: M::State, ctx: &M::Context)
where
    M: QStateMachine + ?Sized,
{
    let mut path: Path<M::State> = Path::new();
    let mut s = target;
    while s != from {
        q_require!(
            s != M::TOP,
            "initial target {:?} is not below {:?}",
            target,
            from
        );
        push(&mut path, s);
        s = superstate(me, s, ctx);
    }
    for &s in path.iter().rev() {
        enter(me, s, ctx);
    }
}

/// Follows nested initial transitions from `state` down to a leaf.
fn drill<M>(me: &mut M, mut state: M::State, ctx: &M::Context) -> M::State
where
    M: QStateMachine + ?Sized,
{
    while let QStateReturn::Tran(target) = trig(me, state, QSignal::INIT, ctx) {
        trace!("init {:?} -> {:?}", state, target);
        enter_from(me, state, target, ctx);
        state = target;
    }
    state
}

pub(crate) fn init<M>(me: &mut M, par: Option<&Evt<'_, M::Payload>>, ctx: &M::Context)
where
    M: QStateMachine + ?Sized,
{
    q_require!(me.hsm().state().is_none(), "state machine initialized twice");

    let target = match me.initial(par, ctx) {
        QStateReturn::Tran(target) => target,
        other => q_error!("top-most initial transition returned {:?}", other),
    };
    trace!("top-most init -> {:?}", target);

    enter_from(me, M::TOP, target, ctx);
    let leaf = drill(me, target, ctx);
    me.hsm_mut().set_state(leaf);
}

pub(crate) fn dispatch<M>(me: &mut M, e: &Evt<'_, M::Payload>, ctx: &M::Context) -> QDispatch
where
    M: QStateMachine + ?Sized,
{
    let Some(current) = me.hsm().state() else {
        q_error!("dispatch of {} before init", e.sig())
    };

    // bubble the event up until some state reacts
    let mut source = current;
    let mut depth = 0;
    let outcome = loop {
        let r = if source == M::TOP {
            QStateReturn::Ignored
        } else {
            me.handle(source, e, ctx)
        };
        match r {
            QStateReturn::Super(parent) => source = parent,
            QStateReturn::Unhandled => source = superstate(me, source, ctx),
            other => break other,
        }
        depth += 1;
        q_require!(
            depth <= MAX_NEST_DEPTH,
            "{:?} is nested deeper than {}",
            current,
            MAX_NEST_DEPTH
        );
    };

    let target = match outcome {
        QStateReturn::Handled => return QDispatch::Handled,
        QStateReturn::Tran(target) => {
            trace!("{} tran {:?} -> {:?}", e.sig(), source, target);
            target
        }
        QStateReturn::TranHist(target) => {
            trace!("{} tran-hist {:?} -> {:?}", e.sig(), source, target);
            target
        }
        _ => {
            trace!("{} ignored in {:?}", e.sig(), current);
            return QDispatch::Ignored;
        }
    };

    // exit from the current state up to the transition source
    let mut s = current;
    while s != source {
        exit(me, s, ctx);
        s = superstate(me, s, ctx);
    }

    let path = tran(me, source, target, ctx);
    for &s in path.iter().rev() {
        enter(me, s, ctx);
    }
    let leaf = drill(me, target, ctx);
    me.hsm_mut().set_state(leaf);
    QDispatch::Transitioned
}

pub(crate) fn is_in<M>(me: &mut M, state: M::State, ctx: &M::Context) -> bool
where
    M: QStateMachine + ?Sized,
{
    let Some(mut s) = me.hsm().state() else {
        q_error!("is_in({:?}) before init", state)
    };
    for _ in 0..=MAX_NEST_DEPTH {
        if s == state {
            return true;
        }
        if s == M::TOP {
            return false;
        }
        s = superstate(me, s, ctx);
    }
    q_error!("superstate chain of {:?} does not reach the top", s)
}

pub(crate) fn child_state<M>(me: &mut M, parent: M::State, ctx: &M::Context) -> M::State
where
    M: QStateMachine + ?Sized,
{
    let Some(current) = me.hsm().state() else {
        q_error!("child_state({:?}) before init", parent)
    };
    let mut child = current;
    let mut s = current;
    for _ in 0..=MAX_NEST_DEPTH {
        if s == parent {
            return child;
        }
        q_require!(s != M::TOP, "{:?} is not an ancestor of {:?}", parent, current);
        child = s;
        s = superstate(me, s, ctx);
    }
    q_error!("superstate chain of {:?} does not reach the top", current)
}
