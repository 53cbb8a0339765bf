//! Priority management for active objects and the priority set

use core::fmt;
use crate::{QError, QResult};

/// Largest number of active objects, and of elements in a [`QPSet`].
pub const MAX_ACTIVE_LIMIT: u8 = 64;

/// Type-safe priority level for active objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QPriority(u8);

impl QPriority {
    /// Priority of the idle context; never assigned to an active object
    pub const IDLE: QPriority = QPriority(0);

    /// Minimum priority level (lowest priority)
    pub const MIN: QPriority = QPriority(1);

    /// Maximum priority level (highest priority)
    pub const MAX: QPriority = QPriority(MAX_ACTIVE_LIMIT);

    /// Create a new priority level
    pub fn new(priority: u8) -> QResult<Self> {
        if priority == 0 || priority > MAX_ACTIVE_LIMIT {
            Err(QError::InvalidPriority)
        } else {
            Ok(QPriority(priority))
        }
    }

    /// Create priority without validation (const fn)
    pub const fn new_unchecked(priority: u8) -> Self {
        QPriority(priority)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Check if this priority can be assigned to an active object
    pub const fn is_valid(self) -> bool {
        self.0 > 0 && self.0 <= MAX_ACTIVE_LIMIT
    }
}

impl fmt::Display for QPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QPriority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// Set of priorities `1..=64` in a single word.
///
/// Element `n` occupies bit `n - 1`, so the highest element is found with one
/// leading-zeros count. Used for the ready set of the schedulers and for the
/// subscriber list of every published signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QPSet {
    bits: u64,
}

impl QPSet {
    /// Empty set
    pub const EMPTY: Self = Self { bits: 0 };

    /// Create a new empty set
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Insert element `n`
    pub fn insert(&mut self, n: u8) {
        self.bits |= Self::bit(n);
    }

    /// Remove element `n`
    pub fn remove(&mut self, n: u8) {
        self.bits &= !Self::bit(n);
    }

    /// Check whether element `n` is present
    pub fn has(&self, n: u8) -> bool {
        (self.bits & Self::bit(n)) != 0
    }

    /// Check if the set is empty
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Highest element present, or 0 when empty
    pub const fn find_max(&self) -> u8 {
        // 64 - lz is the one-based position of the top bit, and 0 for no bits
        (64 - self.bits.leading_zeros()) as u8
    }

    /// Remove every element
    pub fn clear(&mut self) {
        self.bits = 0;
    }

    /// Number of elements present
    pub const fn len(&self) -> u32 {
        self.bits.count_ones()
    }

    /// Raw bit pattern
    pub const fn bits(&self) -> u64 {
        self.bits
    }

    /// Elements in descending order.
    pub fn iter(&self) -> QPSetIter {
        QPSetIter { rest: *self }
    }

    fn bit(n: u8) -> u64 {
        crate::q_require!(
            n > 0 && n <= MAX_ACTIVE_LIMIT,
            "priority set element {} outside 1..={}",
            n,
            MAX_ACTIVE_LIMIT
        );
        1u64 << (n - 1)
    }
}

impl FromIterator<u8> for QPSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = QPSet::new();
        for n in iter {
            set.insert(n);
        }
        set
    }
}

/// Descending iterator over a [`QPSet`] working copy.
#[derive(Debug, Clone)]
pub struct QPSetIter {
    rest: QPSet,
}

impl Iterator for QPSetIter {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        match self.rest.find_max() {
            0 => None,
            n => {
                self.rest.remove(n);
                Some(n)
            }
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QPSet {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QPSet({=u64:b})", self.bits);
    }
}

/// Macro to create compile-time priority constants
#[macro_export]
macro_rules! priority {
    ($value:literal) => {
        $crate::QPriority::new_unchecked($value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_priority_creation() {
        assert!(QPriority::new(0).is_err());
        assert!(QPriority::new(1).is_ok());
        assert!(QPriority::new(64).is_ok());
        assert_eq!(QPriority::new(65), Err(QError::InvalidPriority));
    }

    #[test]
    fn test_find_max_uses_top_bit() {
        let mut set = QPSet::new();
        assert_eq!(set.find_max(), 0);

        set.insert(1);
        assert_eq!(set.find_max(), 1);
        set.insert(64);
        assert_eq!(set.find_max(), 64);
        assert_eq!(set.bits(), (1u64 << 63) | 1);
    }

    #[test]
    fn test_iter_is_descending() {
        let set: QPSet = [2u8, 40, 9, 17].into_iter().collect();
        let order: Vec<u8> = set.iter().collect();
        assert_eq!(order.as_slice(), &[40, 17, 9, 2]);
        assert_eq!(set.len(), 4);
    }

    #[test]
    #[should_panic(expected = "outside 1..=64")]
    fn test_zero_is_rejected() {
        let mut set = QPSet::new();
        set.insert(0);
    }
}
