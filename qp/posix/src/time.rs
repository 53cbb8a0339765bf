//! Clock Tick Service for POSIX
//!
//! Drives [`QF::tick`] for one tick rate from a dedicated thread. Ticks are
//! scheduled on absolute monotonic deadlines so sleep overshoot never
//! accumulates into drift.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};
use qp_core::q_require;
use qp_qf::QF;

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Fastest clock a ticker thread is asked to keep
pub const MAX_TICK_HZ: u32 = 10_000;

/// Frequency of the clock driving one tick rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    rate_hz: u32,
}

impl ClockTick {
    /// A clock ticking `rate_hz` times per second, 1..=[`MAX_TICK_HZ`].
    pub fn new(rate_hz: u32) -> Self {
        q_require!(
            rate_hz > 0 && rate_hz <= MAX_TICK_HZ,
            "clock of {} Hz outside 1..={}",
            rate_hz,
            MAX_TICK_HZ
        );
        ClockTick { rate_hz }
    }

    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    /// Time between two ticks
    pub fn period(&self) -> Duration {
        Duration::from_nanos(NSEC_PER_SEC / u64::from(self.rate_hz))
    }
}

/// Ticker thread body
///
/// Sleeps until the next absolute deadline rather than for a relative
/// duration, then ticks `rate`. Returns once the framework is stopped.
pub(crate) fn tick_loop<P>(qf: &QF<P>, rate: u8, period: Duration) {
    debug!("{}: ticker for rate {} every {:?}", qf.config().name, rate, period);
    let mut next_tick = Instant::now();

    while !qf.is_stopped() {
        next_tick += period;

        if let Some(remaining) = next_tick.checked_duration_since(Instant::now()) {
            thread::sleep(remaining);
        }
        if qf.is_stopped() {
            break;
        }

        trace!("tick of rate {}", rate);
        qf.tick(rate);
    }
    debug!("{}: ticker for rate {} stopped", qf.config().name, rate);
}
