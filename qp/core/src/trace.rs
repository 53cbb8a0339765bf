//! Software-tracing interface.
//!
//! The framework reports what it does as typed [`QsRecord`] values through an
//! optional [`TraceHook`]. Formatting, filtering and transport of the records
//! belong to the tracing collaborator, not to this crate. When no hook is
//! installed nothing is produced and nothing else changes.

use alloc::sync::Arc;

use crate::QSignal;

/// Callback receiving every trace record.
pub type TraceHook = Arc<dyn Fn(&QsRecord) + Send + Sync>;

/// Canonical QS record identifiers.
pub mod ids {
    /// State-machine records
    pub mod qep {
        pub const STATE_ENTRY: u8 = 1;
        pub const STATE_EXIT: u8 = 2;
        pub const STATE_INIT: u8 = 3;
        pub const INIT_TRAN: u8 = 4;
        pub const INTERN_TRAN: u8 = 5;
        pub const TRAN: u8 = 6;
        pub const IGNORED: u8 = 7;
        pub const DISPATCH: u8 = 8;
        pub const UNHANDLED: u8 = 9;
        pub const TRAN_HIST: u8 = 55;
    }

    /// Active-object records
    pub mod active {
        pub const DEFER: u8 = 10;
        pub const RECALL: u8 = 11;
        pub const SUBSCRIBE: u8 = 12;
        pub const UNSUBSCRIBE: u8 = 13;
        pub const POST_FIFO: u8 = 14;
        pub const POST_LIFO: u8 = 15;
        pub const GET: u8 = 16;
        pub const GET_LAST: u8 = 17;
        pub const RECALL_ATTEMPT: u8 = 18;
        pub const POST_ATTEMPT: u8 = 45;
    }

    /// Memory pool and dynamic event records
    pub mod mem {
        pub const MPOOL_GET: u8 = 24;
        pub const MPOOL_PUT: u8 = 25;
        pub const PUBLISH: u8 = 26;
        pub const NEW_REF: u8 = 27;
        pub const NEW: u8 = 28;
        pub const GC_ATTEMPT: u8 = 29;
        pub const GC: u8 = 30;
        pub const DELETE_REF: u8 = 38;
        pub const MPOOL_GET_ATTEMPT: u8 = 47;
    }

    /// Time event records
    pub mod time_evt {
        pub const TICK: u8 = 31;
        pub const ARM: u8 = 32;
        pub const AUTO_DISARM: u8 = 33;
        pub const DISARM_ATTEMPT: u8 = 34;
        pub const DISARM: u8 = 35;
        pub const REARM: u8 = 36;
        pub const POST: u8 = 37;
    }

    /// Scheduler records
    pub mod sched {
        pub const LOCK: u8 = 50;
        pub const UNLOCK: u8 = 51;
        pub const NEXT: u8 = 52;
        pub const IDLE: u8 = 53;
        pub const RESUME: u8 = 54;
    }
}

/// One trace record.
///
/// `prio` always names the active object the record is about; `0` stands for
/// a producer outside any active object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QsRecord {
    /// Top-most initial transition taken
    InitTran { prio: u8 },
    /// Start of a run-to-completion step
    Dispatch { prio: u8, sig: QSignal },
    /// Event handled without a state change
    InternTran { prio: u8, sig: QSignal },
    /// Event caused a state transition
    Tran { prio: u8, sig: QSignal },
    /// Event bubbled to the top state
    Ignored { prio: u8, sig: QSignal },

    /// Event posted to the back of an active object's queue
    PostFifo { prio: u8, sig: QSignal, n_free: u16, n_min: u16 },
    /// Event posted to the front of an active object's queue
    PostLifo { prio: u8, sig: QSignal, n_free: u16, n_min: u16 },
    /// Post refused because of the margin
    PostAttempt { prio: u8, sig: QSignal, n_free: u16, margin: u16 },
    /// Event taken from a queue that still holds more
    Get { prio: u8, sig: QSignal, n_free: u16 },
    /// Last event taken from a queue
    GetLast { prio: u8, sig: QSignal },
    /// Event stored in a deferral queue
    Defer { prio: u8, sig: QSignal },
    /// Deferred event moved back to the active object's queue
    Recall { prio: u8, sig: QSignal },
    /// Recall found the deferral queue empty
    RecallAttempt { prio: u8 },
    /// Subscription added
    Subscribe { prio: u8, sig: QSignal },
    /// Subscription removed
    Unsubscribe { prio: u8, sig: QSignal },
    /// Event multicast to its subscribers
    Publish { sig: QSignal, subscribers: u8 },

    /// Block taken from a pool
    MpoolGet { pool_id: u8, n_free: u16, n_min: u16 },
    /// Allocation refused because of the margin
    MpoolGetAttempt { pool_id: u8, n_free: u16, margin: u16 },
    /// Block returned to a pool
    MpoolPut { pool_id: u8, n_free: u16 },
    /// Pooled event created
    New { sig: QSignal, size: u16 },
    /// Extra reference taken
    NewRef { sig: QSignal, pool_id: u8, ref_ctr: u8 },
    /// Reference dropped without recycling
    GcAttempt { sig: QSignal, pool_id: u8, ref_ctr: u8 },
    /// Event recycled to its pool
    Gc { sig: QSignal, pool_id: u8 },
    /// Handler-owned reference released
    DeleteRef { sig: QSignal, pool_id: u8, ref_ctr: u8 },

    /// Clock tick processed for a rate
    Tick { rate: u8, ctr: u32 },
    /// Time event armed
    TimeEvtArm { prio: u8, sig: QSignal, ctr: u32, interval: u32, rate: u8 },
    /// One-shot time event expired and unlinked
    TimeEvtAutoDisarm { prio: u8, sig: QSignal, rate: u8 },
    /// Disarm of a time event that was not running
    TimeEvtDisarmAttempt { prio: u8, sig: QSignal },
    /// Running time event disarmed
    TimeEvtDisarm { prio: u8, sig: QSignal, ctr: u32, interval: u32 },
    /// Time event counter reset
    TimeEvtRearm { prio: u8, sig: QSignal, ctr: u32, was_armed: bool },
    /// Time event posted to its owner
    TimeEvtPost { prio: u8, sig: QSignal, rate: u8 },

    /// Scheduler locked to a ceiling
    SchedLock { prev: u8, ceiling: u8 },
    /// Scheduler lock released
    SchedUnlock { prev: u8, ceiling: u8 },
    /// Scheduler switched to another active object
    SchedNext { next: u8, prev: u8 },
    /// Scheduler went idle
    SchedIdle { prev: u8 },
    /// Preempted active object resumed
    SchedResume { prio: u8, prev: u8 },
}

impl QsRecord {
    /// Numeric QS record identifier
    pub const fn id(&self) -> u8 {
        use ids::*;
        match self {
            QsRecord::InitTran { .. } => qep::INIT_TRAN,
            QsRecord::Dispatch { .. } => qep::DISPATCH,
            QsRecord::InternTran { .. } => qep::INTERN_TRAN,
            QsRecord::Tran { .. } => qep::TRAN,
            QsRecord::Ignored { .. } => qep::IGNORED,
            QsRecord::PostFifo { .. } => active::POST_FIFO,
            QsRecord::PostLifo { .. } => active::POST_LIFO,
            QsRecord::PostAttempt { .. } => active::POST_ATTEMPT,
            QsRecord::Get { .. } => active::GET,
            QsRecord::GetLast { .. } => active::GET_LAST,
            QsRecord::Defer { .. } => active::DEFER,
            QsRecord::Recall { .. } => active::RECALL,
            QsRecord::RecallAttempt { .. } => active::RECALL_ATTEMPT,
            QsRecord::Subscribe { .. } => active::SUBSCRIBE,
            QsRecord::Unsubscribe { .. } => active::UNSUBSCRIBE,
            QsRecord::Publish { .. } => mem::PUBLISH,
            QsRecord::MpoolGet { .. } => mem::MPOOL_GET,
            QsRecord::MpoolGetAttempt { .. } => mem::MPOOL_GET_ATTEMPT,
            QsRecord::MpoolPut { .. } => mem::MPOOL_PUT,
            QsRecord::New { .. } => mem::NEW,
            QsRecord::NewRef { .. } => mem::NEW_REF,
            QsRecord::GcAttempt { .. } => mem::GC_ATTEMPT,
            QsRecord::Gc { .. } => mem::GC,
            QsRecord::DeleteRef { .. } => mem::DELETE_REF,
            QsRecord::Tick { .. } => time_evt::TICK,
            QsRecord::TimeEvtArm { .. } => time_evt::ARM,
            QsRecord::TimeEvtAutoDisarm { .. } => time_evt::AUTO_DISARM,
            QsRecord::TimeEvtDisarmAttempt { .. } => time_evt::DISARM_ATTEMPT,
            QsRecord::TimeEvtDisarm { .. } => time_evt::DISARM,
            QsRecord::TimeEvtRearm { .. } => time_evt::REARM,
            QsRecord::TimeEvtPost { .. } => time_evt::POST,
            QsRecord::SchedLock { .. } => sched::LOCK,
            QsRecord::SchedUnlock { .. } => sched::UNLOCK,
            QsRecord::SchedNext { .. } => sched::NEXT,
            QsRecord::SchedIdle { .. } => sched::IDLE,
            QsRecord::SchedResume { .. } => sched::RESUME,
        }
    }
}
