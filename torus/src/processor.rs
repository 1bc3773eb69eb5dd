//! Batch event processor: drives one consumer across the ring.
//!
//! The processor owns a private sequence, a barrier and a handler. Its loop
//! waits for the next published batch, hands each event to the handler in
//! order, then releases the whole batch by advancing its sequence. Shutdown
//! is cooperative: `halt` raises the barrier alert and the loop exits at the
//! next wait.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::barrier::SequenceBarrier;
use crate::handler::{ErrorHandler, EventHandler, LogErrorHandler};
use crate::ring::RingBuffer;
use crate::sequence::{AtomicSequence, Sequence};

#[derive(Clone, Copy, PartialEq)]
#[repr(u8)]
pub(crate) enum RunState {
    Idle = 0,
    Halted = 1,
    Running = 2,
}

pub struct BatchEventProcessor<T, H: EventHandler<T>> {
    ring: Arc<RingBuffer<T>>,
    barrier: Arc<SequenceBarrier>,
    handler: H,
    error_handler: Box<dyn ErrorHandler<T>>,
    sequence: Arc<AtomicSequence>,
    running: Arc<AtomicU8>,
}

impl<T, H> BatchEventProcessor<T, H>
where
    T: Send + Sync,
    H: EventHandler<T>,
{
    pub fn new(ring: Arc<RingBuffer<T>>, barrier: SequenceBarrier, handler: H) -> Self {
        BatchEventProcessor {
            ring,
            barrier: Arc::new(barrier),
            handler,
            error_handler: Box::new(LogErrorHandler),
            sequence: Arc::new(AtomicSequence::default()),
            running: Arc::new(AtomicU8::new(RunState::Idle as u8)),
        }
    }

    /// Replace the default logging error handler.
    pub fn with_error_handler(mut self, error_handler: Box<dyn ErrorHandler<T>>) -> Self {
        self.error_handler = error_handler;
        self
    }

    /// This consumer's sequence: the last fully processed event. Register it
    /// as a gating sequence on the ring, and as a barrier dependent of any
    /// downstream stage.
    pub fn sequence(&self) -> Arc<AtomicSequence> {
        self.sequence.clone()
    }

    /// A control handle usable from other threads while `run` executes.
    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle {
            barrier: self.barrier.clone(),
            running: self.running.clone(),
            sequence: self.sequence.clone(),
        }
    }

    /// Run the event loop on the current thread until halted.
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
            tracing::warn!("event processor is already running or halted");
            return;
        }
        self.barrier.clear_alert();
        self.handler.set_sequence_callback(self.sequence.clone());
        if let Err(error) = self.handler.on_start() {
            self.error_handler.handle_start_error(error);
        }
        tracing::debug!("event processor started");

        self.event_loop();

        if let Err(error) = self.handler.on_shutdown() {
            self.error_handler.handle_shutdown_error(error);
        }
        self.running.store(RunState::Idle as u8, Ordering::Release);
        tracing::debug!("event processor stopped");
    }

    fn event_loop(&mut self) {
        let mut next_sequence = self.sequence.get() + 1;

        'event_loop: loop {
            match self.barrier.wait_for(next_sequence) {
                Ok(available) if available >= next_sequence => {
                    let mut sequence = next_sequence;
                    while sequence <= available {
                        // SAFETY: every sequence in [next_sequence, available]
                        // is published and gated for this consumer.
                        let event = unsafe { self.ring.get(sequence) };
                        if let Err(error) =
                            self.handler.on_event(event, sequence, sequence == available)
                        {
                            self.error_handler.handle_event_error(error, sequence, event);
                            // Release up to and including the faulting event,
                            // never past it, and restart after it.
                            self.sequence.set(sequence);
                            next_sequence = sequence + 1;
                            continue 'event_loop;
                        }
                        sequence += 1;
                    }
                    self.sequence.set(available);
                    next_sequence = available + 1;
                }
                Ok(_) => {
                    // Timed-out or spurious wake: nothing new is visible.
                    if let Err(error) = self.handler.on_timeout(next_sequence - 1) {
                        self.error_handler
                            .handle_timeout_error(error, next_sequence - 1);
                    }
                }
                Err(_) => {
                    if self.running.load(Ordering::Acquire) != RunState::Running as u8 {
                        break;
                    }
                }
            }
        }
    }

    /// Run the event loop on a dedicated thread.
    pub fn spawn(self) -> ProcessorThread
    where
        T: 'static,
        H: 'static,
    {
        self.spawn_inner(None)
    }

    /// Run the event loop on a dedicated thread pinned to a CPU core.
    pub fn spawn_pinned(self, core_id: usize) -> ProcessorThread
    where
        T: 'static,
        H: 'static,
    {
        self.spawn_inner(Some(core_id))
    }

    fn spawn_inner(mut self, core_id: Option<usize>) -> ProcessorThread
    where
        T: 'static,
        H: 'static,
    {
        let handle = self.handle();
        let join = thread::spawn(move || {
            if let Some(core_id) = core_id {
                if let Err(error) = crate::affinity::pin_to_core(core_id) {
                    tracing::warn!("failed to pin processor to core {}: {}", core_id, error);
                }
            }
            self.run();
        });
        ProcessorThread { handle, join }
    }
}

/// Remote control for a processor: halt it, inspect its progress.
#[derive(Clone)]
pub struct ProcessorHandle {
    barrier: Arc<SequenceBarrier>,
    running: Arc<AtomicU8>,
    sequence: Arc<AtomicSequence>,
}

impl ProcessorHandle {
    pub(crate) fn new(
        barrier: Arc<SequenceBarrier>,
        running: Arc<AtomicU8>,
        sequence: Arc<AtomicSequence>,
    ) -> Self {
        ProcessorHandle {
            barrier,
            running,
            sequence,
        }
    }

    /// Request shutdown. The event loop exits at its next wait; the
    /// processor never advances past an unprocessed slot.
    pub fn halt(&self) {
        self.running.store(RunState::Halted as u8, Ordering::Release);
        self.barrier.alert();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) == RunState::Running as u8
    }

    pub fn sequence(&self) -> Arc<AtomicSequence> {
        self.sequence.clone()
    }

    pub fn sequence_value(&self) -> Sequence {
        self.sequence.get()
    }
}

/// A processor running on its own thread.
pub struct ProcessorThread {
    handle: ProcessorHandle,
    join: JoinHandle<()>,
}

impl ProcessorThread {
    pub(crate) fn new(handle: ProcessorHandle, join: JoinHandle<()>) -> Self {
        ProcessorThread { handle, join }
    }

    pub fn halt(&self) {
        self.handle.halt();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn sequence(&self) -> Arc<AtomicSequence> {
        self.handle.sequence()
    }

    pub fn handle(&self) -> ProcessorHandle {
        self.handle.clone()
    }

    /// Wait for the processor thread to exit. Call `halt` first unless a
    /// producer-side drain already signalled shutdown.
    pub fn join(self) {
        let _ = self.join.join();
    }
}
