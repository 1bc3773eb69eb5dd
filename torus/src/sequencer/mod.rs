//! Sequencers coordinate slot claims between producers and consumers.
//!
//! A sequencer owns the cursor, the gating sequences (the consumer sequences
//! that bound producer progress) and the wait strategy. Producers claim
//! sequence ranges through it and publish them when the slots are written;
//! consumers learn about published sequences through barriers built from it.
//!
//! Two variants:
//! - [`SingleProducerSequencer`] - one producer thread, no atomic RMW on the
//!   claim path
//! - [`MultiProducerSequencer`] - CAS claims plus a per-slot availability
//!   flag to tolerate out-of-order publication

mod multi;
mod single;

pub use multi::MultiProducerSequencer;
pub use single::SingleProducerSequencer;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, TorusError};
use crate::sequence::{minimum_sequence, AtomicSequence, Sequence};
use crate::wait::WaitStrategy;

/// Largest supported ring size.
pub const MAX_BUFFER_SIZE: usize = 1 << 30;

/// Validate a ring size and convert it for sequence arithmetic.
pub(crate) fn check_buffer_size(size: usize) -> Result<i64> {
    if size == 0 || size > MAX_BUFFER_SIZE {
        return Err(TorusError::config(format!(
            "ring size must be between 1 and 2^30, got {}",
            size
        )));
    }
    if !size.is_power_of_two() {
        return Err(TorusError::config(format!(
            "ring size must be a power of two, got {}",
            size
        )));
    }
    Ok(size as i64)
}

/// Validate a claim batch size against the ring size.
pub(crate) fn check_claim(n: i64, buffer_size: i64) -> Result<()> {
    if n < 1 || n > buffer_size {
        return Err(TorusError::InvalidClaim {
            requested: n,
            buffer_size,
        });
    }
    Ok(())
}

/// Issues sequence claims and publication notices for one ring.
pub trait Sequencer: Send + Sync {
    /// Number of slots in the ring.
    fn buffer_size(&self) -> i64;

    /// The cursor this sequencer advances. For a single producer this is the
    /// highest published sequence; for multiple producers it is the highest
    /// claimed sequence and publication is tracked per slot.
    fn cursor(&self) -> Arc<AtomicSequence>;

    /// The wait strategy shared by this ring's producers and consumers.
    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    /// Whether `required` further slots could be claimed without waiting.
    fn has_available_capacity(&self, required: i64) -> bool;

    /// Slots currently free for claiming.
    fn remaining_capacity(&self) -> i64;

    /// Claim the next sequence, waiting for capacity if the ring is full.
    fn next(&self) -> Result<Sequence> {
        self.next_batch(1)
    }

    /// Claim `n` sequences, waiting for capacity; returns the highest of the
    /// claimed range `[hi - n + 1, hi]`.
    fn next_batch(&self, n: i64) -> Result<Sequence>;

    /// Claim the next sequence or fail immediately with
    /// [`TorusError::InsufficientCapacity`].
    fn try_next(&self) -> Result<Sequence> {
        self.try_next_batch(1)
    }

    /// Claim `n` sequences or fail immediately.
    fn try_next_batch(&self, n: i64) -> Result<Sequence>;

    /// Mark `sequence` as written and visible to consumers.
    fn publish(&self, sequence: Sequence);

    /// Mark the inclusive range `[low, high]` as written, signalling once.
    fn publish_range(&self, low: Sequence, high: Sequence);

    /// Whether `sequence` has been published.
    fn is_available(&self, sequence: Sequence) -> bool;

    /// Highest sequence `k` in `[lower_bound - 1, available]` such that
    /// every sequence in `[lower_bound, k]` has been published. Collapses
    /// out-of-order multi-producer publishes into a contiguous window.
    fn highest_published_sequence(&self, lower_bound: Sequence, available: Sequence) -> Sequence;

    /// Move the claim position to `sequence` without publishing. Recovery
    /// use only; callers must guarantee no producer or consumer is active.
    fn claim(&self, sequence: Sequence);

    /// Register consumer sequences that bound producer progress.
    fn add_gating_sequences(&self, sequences: &[Arc<AtomicSequence>]);

    /// Remove a gating sequence; returns false when it was not registered.
    /// In-flight claims that already observed the sequence are unaffected.
    fn remove_gating_sequence(&self, sequence: &Arc<AtomicSequence>) -> bool;

    /// Snapshot of the currently registered gating sequences.
    fn gating_sequences(&self) -> Vec<Arc<AtomicSequence>>;

    /// Minimum over the gating sequences, bounded by the cursor.
    fn minimum_gating_sequence(&self) -> Sequence;
}

/// The set of gating sequences, readable on the claim hot path while wiring
/// code adds and removes members.
///
/// Readers take an `Arc` snapshot; mutation swaps in a fresh copy under the
/// write lock. The claim path only reaches here on a gating-cache miss.
pub(crate) struct GatingSequences {
    snapshot: RwLock<Arc<[Arc<AtomicSequence>]>>,
}

impl GatingSequences {
    pub(crate) fn new() -> Self {
        GatingSequences {
            snapshot: RwLock::new(Arc::from(Vec::new())),
        }
    }

    pub(crate) fn add(&self, sequences: &[Arc<AtomicSequence>]) {
        let mut guard = self.snapshot.write();
        let mut next: Vec<Arc<AtomicSequence>> = guard.to_vec();
        next.extend(sequences.iter().cloned());
        *guard = Arc::from(next);
    }

    pub(crate) fn remove(&self, sequence: &Arc<AtomicSequence>) -> bool {
        let mut guard = self.snapshot.write();
        let before = guard.len();
        let next: Vec<Arc<AtomicSequence>> = guard
            .iter()
            .filter(|s| !Arc::ptr_eq(s, sequence))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *guard = Arc::from(next);
        removed
    }

    pub(crate) fn snapshot(&self) -> Arc<[Arc<AtomicSequence>]> {
        self.snapshot.read().clone()
    }

    /// Minimum over the current members, bounded above by `fallback`.
    pub(crate) fn minimum(&self, fallback: Sequence) -> Sequence {
        minimum_sequence(&self.snapshot(), fallback)
    }
}
