//! Host scheduling policy for kernel threads
//!
//! Active-object threads run under `SCHED_FIFO` at a real-time priority that
//! mirrors their framework priority, placed just below the top of the
//! real-time range. Ticker threads take the lowest real-time priority.
//! Without the privilege to change policy a thread stays at the default
//! policy and the host scheduler no longer follows framework priorities.

use std::io;

use log::{debug, warn};

/// Scheduling policy a kernel thread ended up with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPolicy {
    /// `SCHED_FIFO` at the given real-time priority
    RealTime(i32),
    /// The host's default time-sharing policy
    Default,
}

/// Real-time priority for the thread of active object `prio`, given the
/// highest `SCHED_FIFO` priority of the host.
pub(crate) fn ao_priority_below(prio: u8, max_active: u8, fifo_max: i32) -> i32 {
    i32::from(prio) + (fifo_max - i32::from(max_active) - 3)
}

/// Real-time priority for the thread of active object `prio`
pub(crate) fn ao_priority(prio: u8, max_active: u8) -> i32 {
    ao_priority_below(prio, max_active, fifo_max())
}

/// Real-time priority for ticker threads
pub(crate) fn tick_priority() -> i32 {
    fifo_min()
}

/// Moves the calling thread to `SCHED_FIFO` at `priority`, staying at the
/// default policy when the host refuses.
pub(crate) fn apply(thread: &str, priority: i32) -> ThreadPolicy {
    match set_fifo(priority) {
        Ok(()) => {
            debug!("{}: SCHED_FIFO priority {}", thread, priority);
            ThreadPolicy::RealTime(priority)
        }
        Err(err) => {
            warn!(
                "{}: SCHED_FIFO priority {} refused ({}), running at the default policy",
                thread, priority, err
            );
            ThreadPolicy::Default
        }
    }
}

#[cfg(unix)]
fn fifo_max() -> i32 {
    match unsafe { libc::sched_get_priority_max(libc::SCHED_FIFO) } {
        -1 => 99,
        max => max,
    }
}

#[cfg(unix)]
fn fifo_min() -> i32 {
    match unsafe { libc::sched_get_priority_min(libc::SCHED_FIFO) } {
        -1 => 1,
        min => min,
    }
}

#[cfg(unix)]
fn set_fifo(priority: i32) -> io::Result<()> {
    // SAFETY: sched_param is plain data; only sched_priority is read by the
    // FIFO policy.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;

    // SAFETY: pthread_self() is always a valid handle to the calling thread
    // and `param` outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}

#[cfg(not(unix))]
fn fifo_max() -> i32 {
    99
}

#[cfg(not(unix))]
fn fifo_min() -> i32 {
    1
}

#[cfg(not(unix))]
fn set_fifo(_priority: i32) -> io::Result<()> {
    Err(io::ErrorKind::Unsupported.into())
}
