//! Torus - lock-free inter-thread event exchange over a preallocated ring.
//!
//! Producers claim sequence numbers, write fixed-slot events in place and
//! publish; consumer stages observe published sequences and process them in
//! order, optionally forming a dependency graph of stages.
//!
//! - [`RingBuffer<T>`] - the slot storage and producer surface
//! - [`BatchEventProcessor`] - drives one consumer, every event in order
//! - [`WorkProcessor`] - pool consumption, each event to exactly one worker
//! - [`wait`] - busy-spin, yielding, sleeping, blocking and timeout waits
//!
//! ```
//! use std::sync::Arc;
//! use torus::{BatchEventProcessor, EventHandler, RingBuffer, Sequence};
//! use torus::wait::BusySpinWaitStrategy;
//!
//! struct Printer;
//!
//! impl EventHandler<u64> for Printer {
//!     fn on_event(
//!         &mut self,
//!         event: &u64,
//!         sequence: Sequence,
//!         _end_of_batch: bool,
//!     ) -> Result<(), torus::EventError> {
//!         println!("{} at {}", event, sequence);
//!         Ok(())
//!     }
//! }
//!
//! let ring = Arc::new(RingBuffer::single_producer(1024, BusySpinWaitStrategy, || 0u64)?);
//! let barrier = ring.new_barrier(&[]);
//! let processor = BatchEventProcessor::new(ring.clone(), barrier, Printer);
//! ring.add_gating_sequences(&[processor.sequence()]);
//!
//! let consumer = processor.spawn();
//! for value in 0..8 {
//!     ring.publish_with(|slot| *slot = value)?;
//! }
//! ring.drain();
//! consumer.halt();
//! consumer.join();
//! # Ok::<(), torus::TorusError>(())
//! ```

pub mod affinity;
pub mod barrier;
pub mod error;
pub mod handler;
pub mod processor;
pub mod ring;
pub mod sequence;
pub mod sequencer;
pub mod wait;
pub mod work;

pub use barrier::SequenceBarrier;
pub use error::{Result, TorusError};
pub use handler::{ErrorHandler, EventError, EventHandler, LogErrorHandler};
pub use processor::{BatchEventProcessor, ProcessorHandle, ProcessorThread};
pub use ring::RingBuffer;
pub use sequence::{AtomicSequence, Sequence, INITIAL_SEQUENCE};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use wait::{WaitResult, WaitStrategy};
pub use work::WorkProcessor;
