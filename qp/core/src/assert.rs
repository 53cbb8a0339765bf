//! Assertion channel for contract violations.
//!
//! Every fatal precondition failure in the framework ends up in
//! [`on_assert`]. The failure is logged, handed to the optional host hook and
//! then turned into a panic, which the host renders as a reset, a halt or an
//! abort through its panic handler.

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;

/// Description of a failed contract check.
#[derive(Debug, Clone, Copy)]
pub struct AssertInfo<'a> {
    /// Module path of the check that failed.
    pub module: &'static str,
    /// What was violated.
    pub message: fmt::Arguments<'a>,
}

impl fmt::Display for AssertInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.module, self.message)
    }
}

/// Host callback invoked before the framework panics.
pub type OnAssert = fn(&AssertInfo<'_>);

static ON_ASSERT: Mutex<Cell<Option<OnAssert>>> = Mutex::new(Cell::new(None));

/// Installs the host callback for contract violations.
pub fn set_on_assert(hook: OnAssert) {
    critical_section::with(|cs| ON_ASSERT.borrow(cs).set(Some(hook)));
}

/// Removes a previously installed host callback.
pub fn clear_on_assert() {
    critical_section::with(|cs| ON_ASSERT.borrow(cs).set(None));
}

/// Reports a contract violation. Never returns.
#[cold]
#[inline(never)]
#[track_caller]
pub fn on_assert(module: &'static str, message: fmt::Arguments<'_>) -> ! {
    let info = AssertInfo { module, message };
    log::error!("assertion failed in {}", info);

    let hook = critical_section::with(|cs| ON_ASSERT.borrow(cs).get());
    if let Some(hook) = hook {
        hook(&info);
    }

    panic!("{}", info)
}

/// Checks a precondition of the calling operation.
#[macro_export]
macro_rules! q_require {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::assert::on_assert(module_path!(), format_args!($($arg)+))
        }
    };
}

/// Checks an internal invariant.
#[macro_export]
macro_rules! q_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::assert::on_assert(module_path!(), format_args!($($arg)+))
        }
    };
}

/// Reports an unconditional contract violation.
#[macro_export]
macro_rules! q_error {
    ($($arg:tt)+) => {
        $crate::assert::on_assert(module_path!(), format_args!($($arg)+))
    };
}
