//! Scheduler port installed by a kernel.

/// Scheduler state saved by [`QPort::sched_lock`] and restored by
/// [`QPort::sched_unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedStatus {
    /// The lock did not raise the ceiling; unlocking does nothing
    Unchanged,
    /// The ceiling was raised from `prev`
    Locked { prev: u8 },
}

/// Hooks through which the framework drives the kernel it runs on.
///
/// The framework calls every hook outside its critical section.
pub trait QPort: Send + Sync {
    /// The queue of `prio` went from empty to non-empty.
    fn queue_signal(&self, prio: u8);

    /// Prevents activation of priorities up to `ceiling`.
    fn sched_lock(&self, _ceiling: u8) -> SchedStatus {
        SchedStatus::Unchanged
    }

    /// Restores the scheduler state saved by `sched_lock`.
    fn sched_unlock(&self, _status: SchedStatus) {}

    /// The framework was asked to stop.
    fn on_stop(&self) {}
}
