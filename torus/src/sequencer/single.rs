//! Single-producer sequencer.
//!
//! With exactly one producer thread there is no claim contention, so the
//! claim state (`next_value`, `cached_gating`) is kept in plain cells and
//! the hot path performs no atomic read-modify-write at all. Publication is
//! a single release store of the cursor.

use std::cell::Cell;
use std::sync::Arc;

use crate::error::{Result, TorusError};
use crate::sequence::{AtomicSequence, Sequence, INITIAL_SEQUENCE};
use crate::sequencer::{check_buffer_size, check_claim, GatingSequences, Sequencer};
use crate::wait::WaitStrategy;

pub struct SingleProducerSequencer {
    buffer_size: i64,
    cursor: Arc<AtomicSequence>,
    gating: GatingSequences,
    wait_strategy: Arc<dyn WaitStrategy>,
    /// Highest claimed sequence. Touched only by the producer thread.
    next_value: Cell<Sequence>,
    /// Cached minimum of the gating sequences, refreshed on wrap checks.
    cached_gating: Cell<Sequence>,
}

// SAFETY: the claim-side cells are only ever accessed from the single
// producer thread, per this sequencer's contract. Every other field is
// atomic or internally synchronized.
unsafe impl Sync for SingleProducerSequencer {}

impl SingleProducerSequencer {
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        let buffer_size = check_buffer_size(buffer_size)?;
        Ok(SingleProducerSequencer {
            buffer_size,
            cursor: Arc::new(AtomicSequence::default()),
            gating: GatingSequences::new(),
            wait_strategy,
            next_value: Cell::new(INITIAL_SEQUENCE),
            cached_gating: Cell::new(INITIAL_SEQUENCE),
        })
    }

    /// Refresh the gating cache if `wrap_point` is not clearly safe yet.
    /// Returns whether the claim can proceed without waiting.
    fn has_capacity(&self, required: i64) -> bool {
        let next_value = self.next_value.get();
        let wrap_point = next_value + required - self.buffer_size;
        let cached = self.cached_gating.get();
        if wrap_point > cached || cached > next_value {
            let min = self.gating.minimum(next_value);
            self.cached_gating.set(min);
            if wrap_point > min {
                return false;
            }
        }
        true
    }
}

impl Sequencer for SingleProducerSequencer {
    fn buffer_size(&self) -> i64 {
        self.buffer_size
    }

    fn cursor(&self) -> Arc<AtomicSequence> {
        self.cursor.clone()
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        self.wait_strategy.clone()
    }

    fn has_available_capacity(&self, required: i64) -> bool {
        self.has_capacity(required)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value.get();
        let consumed = self.gating.minimum(next_value);
        self.buffer_size - (next_value - consumed)
    }

    fn next_batch(&self, n: i64) -> Result<Sequence> {
        check_claim(n, self.buffer_size)?;

        let next_value = self.next_value.get();
        let next = next_value + n;
        let wrap_point = next - self.buffer_size;
        let cached = self.cached_gating.get();

        if wrap_point > cached || cached > next_value {
            loop {
                let min = self.gating.minimum(next_value);
                if wrap_point <= min {
                    self.cached_gating.set(min);
                    break;
                }
                std::thread::yield_now();
            }
        }

        self.next_value.set(next);
        Ok(next)
    }

    fn try_next_batch(&self, n: i64) -> Result<Sequence> {
        check_claim(n, self.buffer_size)?;
        if !self.has_capacity(n) {
            return Err(TorusError::InsufficientCapacity(n));
        }
        let next = self.next_value.get() + n;
        self.next_value.set(next);
        Ok(next)
    }

    fn publish(&self, sequence: Sequence) {
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _low: Sequence, high: Sequence) {
        // A single producer publishes contiguously; the high watermark
        // covers the whole range.
        self.publish(high);
    }

    fn is_available(&self, sequence: Sequence) -> bool {
        sequence <= self.cursor.get()
    }

    fn highest_published_sequence(&self, _lower_bound: Sequence, available: Sequence) -> Sequence {
        available
    }

    fn claim(&self, sequence: Sequence) {
        self.next_value.set(sequence);
    }

    fn add_gating_sequences(&self, sequences: &[Arc<AtomicSequence>]) {
        self.gating.add(sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<AtomicSequence>) -> bool {
        self.gating.remove(sequence)
    }

    fn gating_sequences(&self) -> Vec<Arc<AtomicSequence>> {
        self.gating.snapshot().to_vec()
    }

    fn minimum_gating_sequence(&self) -> Sequence {
        self.gating.minimum(self.cursor.get())
    }
}
