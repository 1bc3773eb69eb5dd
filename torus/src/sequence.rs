//! Atomic sequence counters, isolated to their own cache line.
//!
//! Sequences are the coordination currency of the ring: producers advance a
//! cursor, consumers advance their own sequence, and producers gate on the
//! minimum of the consumer sequences. All of them are updated from different
//! cores, so each counter is padded to a full cache line to keep one thread's
//! stores from invalidating its neighbours' lines.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

/// A position in the ring's event stream.
pub type Sequence = i64;

/// Value of every sequence before any event has been claimed or processed.
pub const INITIAL_SEQUENCE: Sequence = -1;

/// A cache-line-isolated atomic sequence counter.
///
/// Reads are acquire-ordered and writes are release-ordered: a consumer that
/// observes sequence `s` is guaranteed to see every slot write the producer
/// performed before publishing `s`. This pairing is the only mechanism that
/// publishes slot contents to readers.
pub struct AtomicSequence {
    value: CachePadded<AtomicI64>,
}

impl AtomicSequence {
    pub fn new(initial: Sequence) -> Self {
        AtomicSequence {
            value: CachePadded::new(AtomicI64::new(initial)),
        }
    }

    /// Current value (acquire).
    #[inline]
    pub fn get(&self) -> Sequence {
        self.value.load(Ordering::Acquire)
    }

    /// Store a new value (release).
    #[inline]
    pub fn set(&self, new_value: Sequence) {
        self.value.store(new_value, Ordering::Release);
    }

    /// Compare-and-set. Returns true when the value was `expected` and has
    /// been replaced by `new_value`.
    #[inline]
    pub fn compare_and_set(&self, expected: Sequence, new_value: Sequence) -> bool {
        self.value
            .compare_exchange(expected, new_value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Add `n` and return the updated value.
    #[inline]
    pub fn add_and_get(&self, n: i64) -> Sequence {
        self.value.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Increment by one and return the updated value.
    #[inline]
    pub fn increment_and_get(&self) -> Sequence {
        self.add_and_get(1)
    }
}

impl Default for AtomicSequence {
    fn default() -> Self {
        Self::new(INITIAL_SEQUENCE)
    }
}

impl std::fmt::Debug for AtomicSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicSequence").field(&self.get()).finish()
    }
}

/// Minimum over a set of sequences, bounded above by `fallback`.
///
/// An empty set yields `fallback`, which callers pass as the value that
/// should gate progress when no other sequence does (typically the cursor).
pub fn minimum_sequence(sequences: &[Arc<AtomicSequence>], fallback: Sequence) -> Sequence {
    sequences
        .iter()
        .fold(fallback, |min, seq| min.min(seq.get()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_initial_value() {
        assert_eq!(AtomicSequence::default().get(), INITIAL_SEQUENCE);
        assert_eq!(AtomicSequence::new(42).get(), 42);
    }

    #[test]
    fn test_set_and_get() {
        let seq = AtomicSequence::default();
        seq.set(7);
        assert_eq!(seq.get(), 7);
    }

    #[test]
    fn test_compare_and_set() {
        let seq = AtomicSequence::new(3);
        assert!(seq.compare_and_set(3, 4));
        assert!(!seq.compare_and_set(3, 5));
        assert_eq!(seq.get(), 4);
    }

    #[test]
    fn test_add_and_get() {
        let seq = AtomicSequence::new(0);
        assert_eq!(seq.add_and_get(5), 5);
        assert_eq!(seq.increment_and_get(), 6);
        assert_eq!(seq.get(), 6);
    }

    #[test]
    fn test_concurrent_increments() {
        let seq = Arc::new(AtomicSequence::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let seq = seq.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    seq.increment_and_get();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(seq.get(), 8000);
    }

    #[test]
    fn test_minimum_sequence() {
        let a = Arc::new(AtomicSequence::new(5));
        let b = Arc::new(AtomicSequence::new(3));
        assert_eq!(minimum_sequence(&[a.clone(), b.clone()], i64::MAX), 3);
        assert_eq!(minimum_sequence(&[a, b], 1), 1);
        assert_eq!(minimum_sequence(&[], 9), 9);
    }
}
