#![no_std]
#![forbid(unsafe_code)]

//! # QP Core
//!
//! Core types for the QP real-time embedded framework: signals, priorities,
//! the priority set used by every scheduler, event handles, allocation
//! margins and the assertion channel used to report contract violations.

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

use core::fmt;

pub mod assert;
pub mod events;
pub mod priorities;
pub mod trace;

pub use events::*;
pub use priorities::*;
pub use trace::{QsRecord, TraceHook};

#[cfg(test)]
mod tests;

/// QP framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum nesting depth of hierarchical state machines.
pub const MAX_NEST_DEPTH: usize = 6;

/// Upper bound on the number of distinct clock tick rates.
pub const MAX_TICK_RATE_LIMIT: u8 = 15;

/// Upper bound on the number of event pools.
pub const MAX_EPOOL_LIMIT: u8 = 15;

/// Result type used throughout the QP framework
pub type QResult<T> = Result<T, QError>;

/// Recoverable error conditions.
///
/// Contract violations are not represented here; they go through
/// [`assert::on_assert`] and never return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QError {
    /// Event queue has no room left above the requested margin
    QueueFull,
    /// Event pool has no block left above the requested margin
    PoolExhausted,
    /// Priority outside `1..=MAX_ACTIVE_LIMIT`
    InvalidPriority,
    /// Signal outside the range accepted by the operation
    InvalidSignal,
}

impl fmt::Display for QError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QError::QueueFull => write!(f, "Event queue is full"),
            QError::PoolExhausted => write!(f, "Event pool is exhausted"),
            QError::InvalidPriority => write!(f, "Invalid priority level"),
            QError::InvalidSignal => write!(f, "Invalid signal"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for QError {}

#[cfg(feature = "defmt")]
impl defmt::Format for QError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            QError::QueueFull => defmt::write!(fmt, "QueueFull"),
            QError::PoolExhausted => defmt::write!(fmt, "PoolExhausted"),
            QError::InvalidPriority => defmt::write!(fmt, "InvalidPriority"),
            QError::InvalidSignal => defmt::write!(fmt, "InvalidSignal"),
        }
    }
}
