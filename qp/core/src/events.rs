//! Event types and signal definitions for the QP framework

use core::fmt;

/// Type-safe event signal identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QSignal(pub u16);

impl QSignal {
    /// Probe used by the state-machine processor to discover superstates
    pub const EMPTY: QSignal = QSignal(0);
    /// Reserved signal for state entry actions
    pub const ENTRY: QSignal = QSignal(1);
    /// Reserved signal for state exit actions
    pub const EXIT: QSignal = QSignal(2);
    /// Reserved signal for nested initial transitions
    pub const INIT: QSignal = QSignal(3);

    /// First user-defined signal
    pub const USER: QSignal = QSignal(4);

    /// Create a new signal from a raw value
    pub const fn new(signal: u16) -> Self {
        QSignal(signal)
    }

    /// Get the raw signal value
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// True for the signals owned by the state-machine processor
    pub const fn is_reserved(self) -> bool {
        self.0 < Self::USER.0
    }
}

impl fmt::Display for QSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            QSignal::EMPTY => write!(f, "EMPTY"),
            QSignal::ENTRY => write!(f, "ENTRY"),
            QSignal::EXIT => write!(f, "EXIT"),
            QSignal::INIT => write!(f, "INIT"),
            QSignal(raw) => write!(f, "QSignal({})", raw),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QSignal {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QSignal({})", self.0);
    }
}

/// Handle to a static or pooled event.
///
/// A static event has `pool_id == 0` and is never recycled. A pooled event
/// names the pool (`pool_id`, one-based) and the block it occupies; the
/// payload and the reference counter live in that block.
///
/// The handle is neither `Copy` nor `Clone`. A pooled handle is only
/// duplicated through the pool set's `new_ref`, which counts the extra
/// reference, and is only consumed by recycling it or by moving it into a
/// queue.
///
/// A handle returned by `new_ref` is *counted*: it owns one unit of the
/// reference counter. Posting or publishing a counted handle hands that
/// unit to the receiver instead of taking another one.
#[must_use = "a pooled event must be posted, published or recycled"]
#[derive(Debug)]
pub struct QEvt {
    sig: QSignal,
    pool_id: u8,
    block: u16,
    counted: bool,
}

impl QEvt {
    /// Creates a static event. Usable in `const` items.
    pub const fn new_static(sig: QSignal) -> Self {
        Self {
            sig,
            pool_id: 0,
            block: 0,
            counted: false,
        }
    }

    /// Builds a handle to a block checked out of an event pool.
    ///
    /// Only event pools create pooled handles.
    #[doc(hidden)]
    pub const fn from_block(sig: QSignal, pool_id: u8, block: u16) -> Self {
        assert!(pool_id != 0, "pool id 0 denotes a static event");
        Self {
            sig,
            pool_id,
            block,
            counted: false,
        }
    }

    /// Marks a pooled handle as owning one counted reference.
    #[doc(hidden)]
    pub const fn into_counted(self) -> Self {
        let counted = !self.is_static();
        Self { counted, ..self }
    }

    /// Signal of the event
    pub const fn sig(&self) -> QSignal {
        self.sig
    }

    /// One-based pool index, 0 for static events
    pub const fn pool_id(&self) -> u8 {
        self.pool_id
    }

    /// Block index inside the owning pool
    pub const fn block(&self) -> u16 {
        self.block
    }

    /// True when the event is not owned by any pool
    pub const fn is_static(&self) -> bool {
        self.pool_id == 0
    }

    /// Whether the handle owns a unit of the reference counter
    pub const fn is_counted(&self) -> bool {
        self.counted
    }

    /// Duplicates a static event; pooled events yield `None`.
    pub const fn try_clone_static(&self) -> Option<QEvt> {
        if self.is_static() {
            Some(QEvt::new_static(self.sig))
        } else {
            None
        }
    }
}

/// Two handles are equal when they name the same event.
impl PartialEq for QEvt {
    fn eq(&self, other: &Self) -> bool {
        self.sig == other.sig && self.pool_id == other.pool_id && self.block == other.block
    }
}

impl Eq for QEvt {}

#[cfg(feature = "defmt")]
impl defmt::Format for QEvt {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "QEvt(sig={}, pool={}, block={})",
            self.sig.0,
            self.pool_id,
            self.block
        );
    }
}

static RESERVED_EVTS: [QEvt; 4] = [
    QEvt::new_static(QSignal::EMPTY),
    QEvt::new_static(QSignal::ENTRY),
    QEvt::new_static(QSignal::EXIT),
    QEvt::new_static(QSignal::INIT),
];

/// Borrowed view of an event as seen by a state handler.
///
/// Carries the handle together with a reference to the pooled payload, if
/// the event has one.
pub struct Evt<'a, P> {
    evt: &'a QEvt,
    payload: Option<&'a P>,
}

impl<'a, P> Evt<'a, P> {
    /// Wraps a handle and its payload.
    pub const fn new(evt: &'a QEvt, payload: Option<&'a P>) -> Self {
        Self { evt, payload }
    }

    /// Wraps a handle that carries no payload.
    pub const fn bare(evt: &'a QEvt) -> Self {
        Self { evt, payload: None }
    }

    /// One of the processor-internal events (`EMPTY`, `ENTRY`, `EXIT`, `INIT`).
    pub fn reserved(sig: QSignal) -> Self {
        crate::q_require!(sig.is_reserved(), "{} is not a reserved signal", sig);
        Self {
            evt: &RESERVED_EVTS[usize::from(sig.0)],
            payload: None,
        }
    }

    /// Signal of the event
    pub fn sig(&self) -> QSignal {
        self.evt.sig()
    }

    /// Pooled payload, if any
    pub fn payload(&self) -> Option<&'a P> {
        self.payload
    }

    /// Underlying handle, for taking a new reference or deferring
    pub fn handle(&self) -> &'a QEvt {
        self.evt
    }
}

impl<P> Clone for Evt<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Evt<'_, P> {}

impl<P: fmt::Debug> fmt::Debug for Evt<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evt")
            .field("evt", self.evt)
            .field("payload", &self.payload)
            .finish()
    }
}

/// How a queue post or pool allocation reacts to exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Margin {
    /// The operation must succeed; running out is a contract violation.
    Strict,
    /// Succeed only if at least this many free entries remain afterwards.
    Reserve(u16),
}

impl Margin {
    /// Whether an operation may take one entry out of `n_free`.
    pub const fn admits(self, n_free: u16) -> bool {
        match self {
            Margin::Strict => n_free > 0,
            Margin::Reserve(margin) => n_free > margin,
        }
    }

    /// True for [`Margin::Strict`]
    pub const fn is_strict(self) -> bool {
        matches!(self, Margin::Strict)
    }
}

impl fmt::Display for Margin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Margin::Strict => write!(f, "strict"),
            Margin::Reserve(margin) => write!(f, "margin {}", margin),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Margin {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Margin::Strict => defmt::write!(fmt, "strict"),
            Margin::Reserve(margin) => defmt::write!(fmt, "margin {}", margin),
        }
    }
}
