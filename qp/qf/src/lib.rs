#![no_std]
#![forbid(unsafe_code)]

//! # QP Framework (QF)
//!
//! The framework layer: the active-object registry and its event queues,
//! dynamic events drawn from the event pools, publish-subscribe, time events
//! and event deferral.
//!
//! All of it lives in one [`QF`] instance shared as `Arc<QF<P>>` by the
//! kernel and by every active object. Active objects are hierarchical state
//! machines whose handlers reach the framework through an [`ActiveContext`];
//! the kernels in `qp-qv`, `qp-qk` and `qp-posix` decide when each one runs.

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod active;
pub mod config;
mod defer;
pub mod framework;
pub mod port;
mod pubsub;
pub mod queue;
mod registry;
pub mod ticker;
pub mod time;

pub use qp_core::*;
pub use qp_mem::{GcOutcome, QEvtPools, QMPool, QPoolStats};
pub use qp_qep::{QDispatch, QHsm, QStateMachine, QStateReturn};

pub use active::{ActiveContext, ActiveObject, QActive};
pub use config::{QfConfig, QfConfigBuilder};
pub use framework::QF;
pub use port::{QPort, SchedStatus};
pub use queue::QEQueue;
pub use ticker::{QTicker, TickerState};
pub use time::QTimeEvt;

#[cfg(test)]
mod tests;
