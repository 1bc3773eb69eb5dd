//! Simple SPSC example.
//!
//! One producer publishes a million events; one batch processor consumes
//! them and verifies the stream by summing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use torus::wait::BusySpinWaitStrategy;
use torus::{BatchEventProcessor, EventError, EventHandler, RingBuffer, Sequence};

const RING_SIZE: usize = 1024 * 64;
const MESSAGE_COUNT: u64 = 1_000_000;

struct Summer {
    sum: Arc<AtomicU64>,
}

impl EventHandler<u64> for Summer {
    fn on_event(
        &mut self,
        event: &u64,
        _sequence: Sequence,
        _end_of_batch: bool,
    ) -> Result<(), EventError> {
        self.sum.fetch_add(*event, Ordering::Relaxed);
        Ok(())
    }
}

fn main() {
    println!("\n=== Simple SPSC Example ===\n");

    let ring = Arc::new(RingBuffer::single_producer(RING_SIZE, BusySpinWaitStrategy, || 0u64).unwrap());
    let sum = Arc::new(AtomicU64::new(0));

    let processor = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[]),
        Summer { sum: sum.clone() },
    );
    ring.add_gating_sequences(&[processor.sequence()]);
    let consumer = processor.spawn();

    let start = std::time::Instant::now();
    for value in 1..=MESSAGE_COUNT {
        ring.publish_with(|slot| *slot = value).unwrap();
    }
    ring.drain();
    let duration = start.elapsed();

    consumer.halt();
    consumer.join();

    let expected = (MESSAGE_COUNT * (MESSAGE_COUNT + 1)) / 2;
    let sum = sum.load(Ordering::Acquire);
    assert_eq!(sum, expected, "Sum mismatch!");

    let throughput = MESSAGE_COUNT as f64 / duration.as_secs_f64() / 1_000_000.0;
    println!("Throughput: {:.2}M msgs/sec", throughput);
    println!("Verified: sum = {} (expected {})", sum, expected);
}
