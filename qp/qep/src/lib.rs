#![no_std]
#![forbid(unsafe_code)]

//! # QP Event Processor (QEP)
//!
//! Hierarchical state machine engine implementing UML statecharts.
//! Provides the core state machine execution engine with:
//! - Entry and exit actions in the correct nesting order
//! - Transitions through the least common ancestor
//! - Nested initial transitions
//! - Shallow history through [`QStateMachine::child_state`]
//!
//! States are plain values, usually a fieldless enum. A machine answers for
//! every state through one [`QStateMachine::handle`] switch; for a signal a
//! state does not handle it returns [`QStateReturn::Super`] naming its
//! superstate. The distinguished [`QStateMachine::TOP`] state is never
//! handed to the switch.

extern crate alloc;

#[cfg(test)]
extern crate std;

use core::fmt;

use qp_core::Evt;

pub mod hsm;
pub mod transition;


pub use qp_core::MAX_NEST_DEPTH;

/// Result of calling a state handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QStateReturn<S> {
    /// Event handled, no state change
    Handled,
    /// A guard evaluated false; the superstate gets the event
    Unhandled,
    /// Event ignored at the top of the hierarchy
    Ignored,
    /// Event not recognized; the named superstate gets it
    Super(S),
    /// Transition to the named state
    Tran(S),
    /// Transition to a state recorded as shallow history
    TranHist(S),
}

/// Outcome of one run-to-completion step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QDispatch {
    /// Some state handled the event internally
    Handled,
    /// No state handled the event
    Ignored,
    /// The event caused a state transition
    Transitioned,
}

#[cfg(feature = "defmt")]
impl defmt::Format for QDispatch {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            QDispatch::Handled => defmt::write!(fmt, "Handled"),
            QDispatch::Ignored => defmt::write!(fmt, "Ignored"),
            QDispatch::Transitioned => defmt::write!(fmt, "Transitioned"),
        }
    }
}

/// State attribute embedded in every state machine.
#[derive(Debug, Clone)]
pub struct QHsm<S> {
    state: Option<S>,
}

impl<S: Copy> QHsm<S> {
    /// Create an uninitialized state machine attribute
    pub const fn new() -> Self {
        Self { state: None }
    }

    /// Current state, `None` before the top-most initial transition
    pub fn state(&self) -> Option<S> {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: S) {
        self.state = Some(state);
    }
}

impl<S: Copy> Default for QHsm<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Hierarchical state machine.
///
/// Implementors provide the state switch; the processor provides
/// [`init`](QStateMachine::init), [`dispatch`](QStateMachine::dispatch) and
/// the hierarchy queries.
pub trait QStateMachine {
    /// State identifier
    type State: Copy + Eq + fmt::Debug;
    /// Payload carried by the events this machine receives
    type Payload;
    /// Environment handed to every handler call
    type Context: ?Sized;

    /// Root of the hierarchy; ignores every event
    const TOP: Self::State;

    /// Shared access to the embedded state attribute
    fn hsm(&self) -> &QHsm<Self::State>;

    /// Exclusive access to the embedded state attribute
    fn hsm_mut(&mut self) -> &mut QHsm<Self::State>;

    /// Top-most initial pseudostate. Must return [`QStateReturn::Tran`].
    fn initial(
        &mut self,
        par: Option<&Evt<'_, Self::Payload>>,
        ctx: &Self::Context,
    ) -> QStateReturn<Self::State>;

    /// State handler switch.
    fn handle(
        &mut self,
        state: Self::State,
        e: &Evt<'_, Self::Payload>,
        ctx: &Self::Context,
    ) -> QStateReturn<Self::State>;

    /// Current state, `None` before [`init`](QStateMachine::init)
    fn state(&self) -> Option<Self::State> {
        self.hsm().state()
    }

    /// Executes the top-most initial transition. Call exactly once.
    fn init(&mut self, par: Option<&Evt<'_, Self::Payload>>, ctx: &Self::Context) {
        hsm::init(self, par, ctx);
    }

    /// Processes one event to completion.
    fn dispatch(&mut self, e: &Evt<'_, Self::Payload>, ctx: &Self::Context) -> QDispatch {
        hsm::dispatch(self, e, ctx)
    }

    /// True when `state` is the current state or one of its superstates.
    fn is_in(&mut self, state: Self::State, ctx: &Self::Context) -> bool {
        hsm::is_in(self, state, ctx)
    }

    /// Direct child of `parent` on the path to the current state.
    ///
    /// Saving this value on exit from `parent` and later returning
    /// [`QStateReturn::TranHist`] with it implements shallow history.
    fn child_state(&mut self, parent: Self::State, ctx: &Self::Context) -> Self::State {
        hsm::child_state(self, parent, ctx)
    }
}
