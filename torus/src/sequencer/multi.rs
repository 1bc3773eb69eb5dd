//! Multi-producer sequencer.
//!
//! Claims race through a CAS on the cursor, so the cursor tracks the highest
//! *claimed* sequence. Because producers finish writing their slots in any
//! order, publication is recorded per slot in an availability buffer: slot
//! `s & mask` stores the generation `s >> log2(size)` once `s` is published.
//! Consumers collapse that into a contiguous window with
//! [`highest_published_sequence`](Sequencer::highest_published_sequence).

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::error::{Result, TorusError};
use crate::sequence::{AtomicSequence, Sequence};
use crate::sequencer::{check_buffer_size, check_claim, GatingSequences, Sequencer};
use crate::wait::WaitStrategy;

/// Per-slot publication flags. The generation encoding makes a slot
/// self-describing across wraps: no flag ever needs clearing, a stale value
/// simply never matches the queried sequence's generation.
struct AvailabilityBuffer {
    flags: Box<[AtomicI32]>,
    index_mask: i64,
    index_shift: u32,
}

impl AvailabilityBuffer {
    fn new(buffer_size: i64) -> Self {
        AvailabilityBuffer {
            flags: (0..buffer_size).map(|_| AtomicI32::new(-1)).collect(),
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
        }
    }

    #[inline]
    fn flag_for(&self, sequence: Sequence) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    #[inline]
    fn set(&self, sequence: Sequence) {
        let index = (sequence & self.index_mask) as usize;
        self.flags[index].store(self.flag_for(sequence), Ordering::Release);
    }

    #[inline]
    fn is_set(&self, sequence: Sequence) -> bool {
        let index = (sequence & self.index_mask) as usize;
        self.flags[index].load(Ordering::Acquire) == self.flag_for(sequence)
    }
}

pub struct MultiProducerSequencer {
    buffer_size: i64,
    cursor: Arc<AtomicSequence>,
    gating: GatingSequences,
    /// Shared cache of the gating minimum, so racing claimers do not all
    /// re-scan the gating set.
    gating_cache: AtomicSequence,
    wait_strategy: Arc<dyn WaitStrategy>,
    available: AvailabilityBuffer,
}

impl MultiProducerSequencer {
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        let buffer_size = check_buffer_size(buffer_size)?;
        Ok(MultiProducerSequencer {
            buffer_size,
            cursor: Arc::new(AtomicSequence::default()),
            gating: GatingSequences::new(),
            gating_cache: AtomicSequence::default(),
            wait_strategy,
            available: AvailabilityBuffer::new(buffer_size),
        })
    }

    fn has_capacity(&self, required: i64, cursor_value: Sequence) -> bool {
        let wrap_point = cursor_value + required - self.buffer_size;
        let cached = self.gating_cache.get();
        if wrap_point > cached || cached > cursor_value {
            let min = self.gating.minimum(cursor_value);
            self.gating_cache.set(min);
            if wrap_point > min {
                return false;
            }
        }
        true
    }
}

impl Sequencer for MultiProducerSequencer {
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
        self.has_capacity(required, self.cursor.get())
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.cursor.get();
        let consumed = self.gating.minimum(produced);
        self.buffer_size - (produced - consumed)
    }

    fn next_batch(&self, n: i64) -> Result<Sequence> {
        check_claim(n, self.buffer_size)?;

        loop {
            let current = self.cursor.get();
            let next = current + n;
            let wrap_point = next - self.buffer_size;
            let cached = self.gating_cache.get();

            if wrap_point > cached || cached > current {
                let min = self.gating.minimum(current);
                if wrap_point > min {
                    std::thread::yield_now();
                    continue;
                }
                self.gating_cache.set(min);
            } else if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn try_next_batch(&self, n: i64) -> Result<Sequence> {
        check_claim(n, self.buffer_size)?;

        loop {
            let current = self.cursor.get();
            let next = current + n;
            if !self.has_capacity(n, current) {
                return Err(TorusError::InsufficientCapacity(n));
            }
            if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
            std::hint::spin_loop();
        }
    }

    fn publish(&self, sequence: Sequence) {
        self.available.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, low: Sequence, high: Sequence) {
        for sequence in low..=high {
            self.available.set(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: Sequence) -> bool {
        self.available.is_set(sequence)
    }

    fn highest_published_sequence(&self, lower_bound: Sequence, available: Sequence) -> Sequence {
        for sequence in lower_bound..=available {
            if !self.available.is_set(sequence) {
                return sequence - 1;
            }
        }
        available
    }

    fn claim(&self, sequence: Sequence) {
        self.cursor.set(sequence);
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
