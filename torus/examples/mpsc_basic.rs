//! MPSC example.
//!
//! Four producer threads race claims into one ring; a single batch
//! processor observes every event in sequence order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use torus::wait::YieldingWaitStrategy;
use torus::{BatchEventProcessor, EventError, EventHandler, RingBuffer, Sequence};

const RING_SIZE: usize = 1024 * 16;
const PRODUCERS: u64 = 4;
const PER_PRODUCER: u64 = 250_000;

struct Counter {
    received: Arc<AtomicU64>,
    sum: Arc<AtomicU64>,
}

impl EventHandler<u64> for Counter {
    fn on_event(
        &mut self,
        event: &u64,
        _sequence: Sequence,
        _end_of_batch: bool,
    ) -> Result<(), EventError> {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(*event, Ordering::Relaxed);
        Ok(())
    }
}

fn main() {
    println!("\n=== MPSC Example ===\n");

    let ring = Arc::new(
        RingBuffer::multi_producer(RING_SIZE, YieldingWaitStrategy::new(), || 0u64).unwrap(),
    );
    let received = Arc::new(AtomicU64::new(0));
    let sum = Arc::new(AtomicU64::new(0));

    let processor = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[]),
        Counter { received: received.clone(), sum: sum.clone() },
    );
    ring.add_gating_sequences(&[processor.sequence()]);
    let consumer = processor.spawn();

    let start = std::time::Instant::now();
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let ring = ring.clone();
            thread::spawn(move || {
                for value in 1..=PER_PRODUCER {
                    ring.publish_with(|slot| *slot = value).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    ring.drain();
    let duration = start.elapsed();

    consumer.halt();
    consumer.join();

    let total = PRODUCERS * PER_PRODUCER;
    let expected = PRODUCERS * (PER_PRODUCER * (PER_PRODUCER + 1)) / 2;
    assert_eq!(received.load(Ordering::Acquire), total);
    assert_eq!(sum.load(Ordering::Acquire), expected);

    let throughput = total as f64 / duration.as_secs_f64() / 1_000_000.0;
    println!("Producers: {}", PRODUCERS);
    println!("Throughput: {:.2}M msgs/sec", throughput);
    println!("Verified: {} events, sum = {}", total, expected);
}
