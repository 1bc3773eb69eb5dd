//! The ring buffer shell: preallocated slot storage plus delegation of all
//! sequencing to the ring's sequencer.
//!
//! Slots are never guarded by a lock. Exclusive ownership moves with the
//! sequencing protocol: a claimed slot belongs to its claimer until
//! published, then to consumers in stage order until the slowest gating
//! sequence passes it.

use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::barrier::SequenceBarrier;
use crate::error::Result;
use crate::sequence::{AtomicSequence, Sequence};
use crate::sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
use crate::wait::WaitStrategy;

pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    mask: i64,
    sequencer: Arc<dyn Sequencer>,
}

// SAFETY: slot access is serialized by the sequencing protocol. A slot is
// written by exactly one claimer before publication and only read by
// consumers afterwards; concurrent shared reads require `T: Sync`.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Create a ring driven by a single producer thread.
    pub fn single_producer<W, F>(size: usize, wait_strategy: W, factory: F) -> Result<Self>
    where
        W: WaitStrategy + 'static,
        F: FnMut() -> T,
    {
        let sequencer = SingleProducerSequencer::new(size, Arc::new(wait_strategy))?;
        Ok(Self::with_sequencer(Arc::new(sequencer), factory))
    }

    /// Create a ring that accepts claims from any number of producer
    /// threads.
    pub fn multi_producer<W, F>(size: usize, wait_strategy: W, factory: F) -> Result<Self>
    where
        W: WaitStrategy + 'static,
        F: FnMut() -> T,
    {
        let sequencer = MultiProducerSequencer::new(size, Arc::new(wait_strategy))?;
        Ok(Self::with_sequencer(Arc::new(sequencer), factory))
    }

    /// Create a ring over an already-constructed sequencer. The sequencer's
    /// buffer size has been validated by its own constructor.
    pub fn with_sequencer<F>(sequencer: Arc<dyn Sequencer>, mut factory: F) -> Self
    where
        F: FnMut() -> T,
    {
        let size = sequencer.buffer_size();
        RingBuffer {
            slots: (0..size).map(|_| UnsafeCell::new(factory())).collect(),
            mask: size - 1,
            sequencer,
        }
    }

    pub fn buffer_size(&self) -> i64 {
        self.sequencer.buffer_size()
    }

    /// Highest sequence the producers have made available.
    pub fn cursor_value(&self) -> Sequence {
        self.sequencer.cursor().get()
    }

    #[inline]
    fn index(&self, sequence: Sequence) -> usize {
        (sequence & self.mask) as usize
    }

    /// Read the slot for `sequence`.
    ///
    /// # Safety
    ///
    /// - `sequence` must have been published, and not yet passed by every
    ///   gating sequence reading it.
    /// - The caller must not hold the reference past its own sequence
    ///   advancing over `sequence`.
    #[inline]
    pub unsafe fn get(&self, sequence: Sequence) -> &T {
        &*self.slots[self.index(sequence)].get()
    }

    /// Write access to the slot for `sequence`.
    ///
    /// # Safety
    ///
    /// - `sequence` must be claimed by the caller via `next`/`try_next` and
    ///   not yet published.
    /// - No other reference to the slot may exist.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, sequence: Sequence) -> &mut T {
        &mut *self.slots[self.index(sequence)].get()
    }

    /// Claim the next sequence, waiting for capacity.
    pub fn next(&self) -> Result<Sequence> {
        self.sequencer.next()
    }

    /// Claim `n` sequences, waiting for capacity; returns the highest.
    pub fn next_batch(&self, n: i64) -> Result<Sequence> {
        self.sequencer.next_batch(n)
    }

    /// Claim the next sequence or fail with
    /// [`TorusError::InsufficientCapacity`](crate::TorusError::InsufficientCapacity).
    pub fn try_next(&self) -> Result<Sequence> {
        self.sequencer.try_next()
    }

    /// Claim `n` sequences or fail immediately.
    pub fn try_next_batch(&self, n: i64) -> Result<Sequence> {
        self.sequencer.try_next_batch(n)
    }

    /// Make `sequence` visible to consumers.
    pub fn publish(&self, sequence: Sequence) {
        self.sequencer.publish(sequence);
    }

    /// Make the inclusive range `[low, high]` visible to consumers.
    pub fn publish_range(&self, low: Sequence, high: Sequence) {
        self.sequencer.publish_range(low, high);
    }

    /// Whether `sequence` has been published.
    pub fn is_published(&self, sequence: Sequence) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// Claim one slot, populate it in place and publish it. Blocks while the
    /// ring is full.
    pub fn publish_with<F>(&self, write: F) -> Result<Sequence>
    where
        F: FnOnce(&mut T),
    {
        let sequence = self.sequencer.next()?;
        // SAFETY: the claim grants exclusive slot access until publication.
        write(unsafe { self.get_mut(sequence) });
        self.sequencer.publish(sequence);
        Ok(sequence)
    }

    /// `publish_with` without waiting; fails when the ring is full.
    pub fn try_publish_with<F>(&self, write: F) -> Result<Sequence>
    where
        F: FnOnce(&mut T),
    {
        let sequence = self.sequencer.try_next()?;
        // SAFETY: the claim grants exclusive slot access until publication.
        write(unsafe { self.get_mut(sequence) });
        self.sequencer.publish(sequence);
        Ok(sequence)
    }

    /// Claim `n` slots, populate each in place and publish the whole range
    /// with a single signal. Returns the inclusive published range.
    pub fn publish_batch_with<F>(&self, n: i64, mut write: F) -> Result<(Sequence, Sequence)>
    where
        F: FnMut(&mut T, Sequence),
    {
        let high = self.sequencer.next_batch(n)?;
        let low = high - n + 1;
        for sequence in low..=high {
            // SAFETY: the claim grants exclusive access to each slot in the
            // range until publication.
            write(unsafe { self.get_mut(sequence) }, sequence);
        }
        self.sequencer.publish_range(low, high);
        Ok((low, high))
    }

    /// Build a barrier over the cursor and the given upstream stage
    /// sequences. An empty list gates on the cursor alone.
    pub fn new_barrier(&self, dependents: &[Arc<AtomicSequence>]) -> SequenceBarrier {
        SequenceBarrier::new(self.sequencer.clone(), dependents.to_vec())
    }

    /// Register consumer sequences that bound producer progress.
    pub fn add_gating_sequences(&self, sequences: &[Arc<AtomicSequence>]) {
        self.sequencer.add_gating_sequences(sequences);
    }

    /// Remove a gating sequence; in-flight claims are unaffected.
    pub fn remove_gating_sequence(&self, sequence: &Arc<AtomicSequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Minimum over the gating sequences, bounded by the cursor.
    pub fn minimum_gating_sequence(&self) -> Sequence {
        self.sequencer.minimum_gating_sequence()
    }

    /// Whether `required` further slots could be claimed without waiting.
    pub fn has_available_capacity(&self, required: i64) -> bool {
        self.sequencer.has_available_capacity(required)
    }

    /// Slots currently free for claiming.
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// Move the ring to `sequence`, publishing it.
    ///
    /// Administrative recovery only. Defined solely under quiescence: no
    /// producer may hold a claim and no processor may be running. Every
    /// registered gating sequence is re-pointed to `sequence` so subsequent
    /// claims see a full ring.
    pub fn reset_to(&self, sequence: Sequence) {
        self.sequencer.claim(sequence);
        self.sequencer.publish(sequence);
        for gate in self.sequencer.gating_sequences() {
            gate.set(sequence);
        }
    }

    /// Wait until every gating sequence has caught up with the cursor.
    /// Returns immediately when no gating sequences are registered.
    pub fn drain(&self) {
        let produced = self.cursor_value();
        while self.sequencer.minimum_gating_sequence() < produced {
            self.sequencer.wait_strategy().signal_all_when_blocking();
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TorusError;
    use crate::wait::BusySpinWaitStrategy;

    fn ring(size: usize) -> RingBuffer<i64> {
        RingBuffer::single_producer(size, BusySpinWaitStrategy, || 0).unwrap()
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(matches!(
            RingBuffer::single_producer(0, BusySpinWaitStrategy, || 0i64),
            Err(TorusError::Config(_))
        ));
        assert!(matches!(
            RingBuffer::single_producer(24, BusySpinWaitStrategy, || 0i64),
            Err(TorusError::Config(_))
        ));
        assert!(matches!(
            RingBuffer::multi_producer((1usize << 30) * 2, BusySpinWaitStrategy, || 0i64),
            Err(TorusError::Config(_))
        ));
    }

    #[test]
    fn test_publish_with_roundtrip() {
        let ring = ring(8);
        let seq = ring.publish_with(|slot| *slot = 42).unwrap();
        assert_eq!(seq, 0);
        assert!(ring.is_published(0));
        assert_eq!(unsafe { *ring.get(0) }, 42);
    }

    #[test]
    fn test_publish_batch_wraps_indices() {
        let ring = ring(4);
        let gate = Arc::new(AtomicSequence::new(i64::MAX));
        ring.add_gating_sequences(&[gate]);

        // Two generations through the same four slots.
        for round in 0..2 {
            let (low, high) = ring.publish_batch_with(4, |slot, seq| *slot = seq * 10).unwrap();
            assert_eq!(low, round * 4);
            assert_eq!(high, low + 3);
            for seq in low..=high {
                assert_eq!(unsafe { *ring.get(seq) }, seq * 10);
            }
        }
    }

    #[test]
    fn test_try_publish_when_full() {
        let ring = ring(2);
        let gate = Arc::new(AtomicSequence::default());
        ring.add_gating_sequences(&[gate.clone()]);

        assert!(ring.try_publish_with(|slot| *slot = 1).is_ok());
        assert!(ring.try_publish_with(|slot| *slot = 2).is_ok());
        assert!(matches!(
            ring.try_publish_with(|slot| *slot = 3),
            Err(TorusError::InsufficientCapacity(_))
        ));

        gate.set(0);
        assert!(ring.try_publish_with(|slot| *slot = 3).is_ok());
    }

    #[test]
    fn test_capacity_queries() {
        let ring = ring(8);
        let gate = Arc::new(AtomicSequence::default());
        ring.add_gating_sequences(&[gate]);

        assert_eq!(ring.remaining_capacity(), 8);
        assert!(ring.has_available_capacity(8));
        ring.publish_with(|slot| *slot = 1).unwrap();
        assert_eq!(ring.remaining_capacity(), 7);
        assert!(!ring.has_available_capacity(8));
    }

    #[test]
    fn test_reset_to_repoints_gating_sequences() {
        let ring = ring(8);
        let gate = Arc::new(AtomicSequence::default());
        ring.add_gating_sequences(&[gate.clone()]);

        ring.reset_to(41);
        assert_eq!(ring.cursor_value(), 41);
        assert_eq!(gate.get(), 41);

        // Claims resume from the reset point with a full ring.
        assert_eq!(ring.publish_with(|slot| *slot = 7).unwrap(), 42);
        assert_eq!(ring.remaining_capacity(), 7);
    }

    #[test]
    fn test_gating_removal_restores_claims() {
        let ring = ring(4);
        let gate = Arc::new(AtomicSequence::default());
        ring.add_gating_sequences(&[gate.clone()]);

        for _ in 0..4 {
            ring.publish_with(|slot| *slot = 0).unwrap();
        }
        assert!(ring.try_next().is_err());

        // Removing the stalled consumer unblocks the producer.
        assert!(ring.remove_gating_sequence(&gate));
        assert!(ring.try_next().is_ok());
    }
}
