//! Sequence barriers: a consumer's coordinated view of producer progress.
//!
//! A barrier pairs the sequencer's cursor with the sequences of any upstream
//! consumer stages. `wait_for` blocks (per the ring's wait strategy) until
//! the slowest of those has reached the target, then reports the highest
//! contiguously *published* sequence in range. The alert flag is the
//! cooperative shutdown signal: once raised, any wait aborts with
//! [`TorusError::Alerted`] until the flag is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, TorusError};
use crate::sequence::{AtomicSequence, Sequence};
use crate::sequencer::Sequencer;
use crate::wait::WaitStrategy;

pub struct SequenceBarrier {
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<AtomicSequence>,
    /// Upstream stage sequences; gates on the cursor alone when empty at
    /// construction.
    dependents: Box<[Arc<AtomicSequence>]>,
    alerted: AtomicBool,
}

impl SequenceBarrier {
    pub(crate) fn new(
        sequencer: Arc<dyn Sequencer>,
        dependents: Vec<Arc<AtomicSequence>>,
    ) -> Self {
        let cursor = sequencer.cursor();
        let wait_strategy = sequencer.wait_strategy();
        let dependents = if dependents.is_empty() {
            vec![cursor.clone()]
        } else {
            dependents
        };
        SequenceBarrier {
            sequencer,
            wait_strategy,
            cursor,
            dependents: dependents.into_boxed_slice(),
            alerted: AtomicBool::new(false),
        }
    }

    /// Wait until `sequence` is available to this consumer.
    ///
    /// Returns the highest published sequence at or beyond `sequence`, or a
    /// value below `sequence` when the wait strategy timed out or the
    /// published prefix has not reached the target yet. Callers loop on the
    /// latter.
    pub fn wait_for(&self, sequence: Sequence) -> Result<Sequence> {
        self.check_alert()?;

        let result =
            self.wait_strategy
                .wait_for(sequence, &self.cursor, &self.dependents, &self.alerted)?;
        if result.available < sequence {
            return Ok(result.available);
        }
        Ok(self
            .sequencer
            .highest_published_sequence(sequence, result.available))
    }

    /// Current cursor observation.
    pub fn cursor_value(&self) -> Sequence {
        self.cursor.get()
    }

    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    /// Raise the alert and wake any blocked waiter.
    pub fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    pub fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    /// Fail with [`TorusError::Alerted`] if the alert is raised.
    pub fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            Err(TorusError::Alerted)
        } else {
            Ok(())
        }
    }
}
