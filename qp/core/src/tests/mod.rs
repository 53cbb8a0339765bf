//! Unit tests for the assertion channel.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::assert::{self, AssertInfo};

static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

fn count_hook(info: &AssertInfo<'_>) {
    assert!(info.module.starts_with("qp_core"));
    HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
#[should_panic(expected = "qp_core::tests: limit 3 exceeded")]
fn failed_requirement_reports_module_and_message() {
    let limit = 3;
    crate::q_require!(limit < 3, "limit {} exceeded", limit);
}

#[test]
fn passing_requirement_is_silent() {
    crate::q_require!(1 + 1 == 2, "arithmetic");
}

#[test]
fn hook_runs_before_panic() {
    assert::set_on_assert(count_hook);
    let before = HOOK_CALLS.load(Ordering::SeqCst);

    let outcome = std::panic::catch_unwind(|| {
        crate::q_error!("unreachable branch");
    });

    assert::clear_on_assert();
    assert!(outcome.is_err());
    assert!(HOOK_CALLS.load(Ordering::SeqCst) > before);
}
