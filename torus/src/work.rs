//! Work processors: a pool of consumers splitting one stream.
//!
//! Unlike batch processors, which each see every event, work processors
//! share a claim counter. Each worker CASes the shared work sequence forward
//! by one and becomes the exclusive processor of the sequence it claimed, so
//! every event is handled exactly once by exactly one worker.
//!
//! Wiring: give every worker the same `work_sequence`, and register each
//! worker's own [`sequence`](WorkProcessor::sequence) together with the work
//! sequence as gating sequences on the ring.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use crate::barrier::SequenceBarrier;
use crate::handler::{ErrorHandler, EventHandler, LogErrorHandler};
use crate::processor::{ProcessorHandle, ProcessorThread, RunState};
use crate::ring::RingBuffer;
use crate::sequence::{AtomicSequence, Sequence};

pub struct WorkProcessor<T, H: EventHandler<T>> {
    ring: Arc<RingBuffer<T>>,
    barrier: Arc<SequenceBarrier>,
    handler: H,
    error_handler: Box<dyn ErrorHandler<T>>,
    /// This worker's last processed sequence; gates the producers.
    sequence: Arc<AtomicSequence>,
    /// The pool's shared claim counter.
    work_sequence: Arc<AtomicSequence>,
    running: Arc<AtomicU8>,
}

impl<T, H> WorkProcessor<T, H>
where
    T: Send + Sync,
    H: EventHandler<T>,
{
    pub fn new(
        ring: Arc<RingBuffer<T>>,
        barrier: SequenceBarrier,
        handler: H,
        work_sequence: Arc<AtomicSequence>,
    ) -> Self {
        WorkProcessor {
            ring,
            barrier: Arc::new(barrier),
            handler,
            error_handler: Box::new(LogErrorHandler),
            sequence: Arc::new(AtomicSequence::default()),
            work_sequence,
            running: Arc::new(AtomicU8::new(RunState::Idle as u8)),
        }
    }

    pub fn with_error_handler(mut self, error_handler: Box<dyn ErrorHandler<T>>) -> Self {
        self.error_handler = error_handler;
        self
    }

    pub fn sequence(&self) -> Arc<AtomicSequence> {
        self.sequence.clone()
    }

    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle::new(self.barrier.clone(), self.running.clone(), self.sequence.clone())
    }

    /// Run the work loop on the current thread until halted.
    pub fn run(&mut self) {
        if self
            .running
            .compare_exchange(
                RunState::Idle as u8,
                RunState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::warn!("work processor is already running or halted");
            return;
        }
        self.barrier.clear_alert();
        self.handler.set_sequence_callback(self.sequence.clone());
        if let Err(error) = self.handler.on_start() {
            self.error_handler.handle_start_error(error);
        }
        tracing::debug!("work processor started");

        self.work_loop();

        if let Err(error) = self.handler.on_shutdown() {
            self.error_handler.handle_shutdown_error(error);
        }
        self.running.store(RunState::Idle as u8, Ordering::Release);
        tracing::debug!("work processor stopped");
    }

    fn work_loop(&mut self) {
        let mut processed = true;
        let mut cached_available = Sequence::MIN;
        let mut next_sequence = self.work_sequence.get();

        loop {
            if processed {
                processed = false;
                // Claim the next sequence for this worker. Publishing
                // `claimed - 1` first keeps the gating view conservative:
                // producers can never overwrite a claimed-but-unprocessed
                // slot.
                loop {
                    next_sequence = self.work_sequence.get() + 1;
                    self.sequence.set(next_sequence - 1);
                    if self
                        .work_sequence
                        .compare_and_set(next_sequence - 1, next_sequence)
                    {
                        break;
                    }
                }
            }

            if cached_available >= next_sequence {
                // SAFETY: `next_sequence` is published (the barrier said so)
                // and this worker won the claim for it.
                let event = unsafe { self.ring.get(next_sequence) };
                if let Err(error) = self.handler.on_event(event, next_sequence, true) {
                    self.error_handler
                        .handle_event_error(error, next_sequence, event);
                }
                processed = true;
            } else {
                match self.barrier.wait_for(next_sequence) {
                    Ok(available) => cached_available = available,
                    Err(_) => {
                        if self.running.load(Ordering::Acquire) != RunState::Running as u8 {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Run the work loop on a dedicated thread.
    pub fn spawn(self) -> ProcessorThread
    where
        T: 'static,
        H: 'static,
    {
        let mut this = self;
        let handle = this.handle();
        let join = thread::spawn(move || this.run());
        ProcessorThread::new(handle, join)
    }
}
