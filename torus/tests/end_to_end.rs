//! End-to-end producer/consumer scenarios.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use torus::wait::{BlockingWaitStrategy, BusySpinWaitStrategy, YieldingWaitStrategy};
use torus::{BatchEventProcessor, EventError, EventHandler, RingBuffer, Sequence};

struct Recorder<T: Clone> {
    seen: Arc<Mutex<Vec<T>>>,
    delay: Option<Duration>,
}

impl<T: Clone + Send + Sync> EventHandler<T> for Recorder<T> {
    fn on_event(
        &mut self,
        event: &T,
        _sequence: Sequence,
        _end_of_batch: bool,
    ) -> Result<(), EventError> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.seen.lock().push(event.clone());
        Ok(())
    }
}

#[test]
fn single_producer_single_consumer_in_order() {
    let ring = Arc::new(RingBuffer::single_producer(16, BusySpinWaitStrategy, || 0i64).unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let processor = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[]),
        Recorder { seen: seen.clone(), delay: None },
    );
    ring.add_gating_sequences(&[processor.sequence()]);
    let consumer = processor.spawn();

    for value in 0..1000i64 {
        ring.publish_with(|slot| *slot = value).unwrap();
    }
    ring.drain();
    consumer.halt();
    consumer.join();

    assert_eq!(*seen.lock(), (0..1000).collect::<Vec<_>>());
}

#[test]
fn multi_producer_single_consumer_orders_per_producer() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 10_000;

    let ring = Arc::new(
        RingBuffer::multi_producer(4096, YieldingWaitStrategy::new(), || (0u64, 0u64)).unwrap(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let processor = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[]),
        Recorder { seen: seen.clone(), delay: None },
    );
    ring.add_gating_sequences(&[processor.sequence()]);
    let consumer = processor.spawn();

    let mut producers = vec![];
    for producer_id in 0..PRODUCERS {
        let ring = ring.clone();
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                ring.publish_with(|slot| *slot = (producer_id, i)).unwrap();
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }
    ring.drain();
    consumer.halt();
    consumer.join();

    let seen = seen.lock();
    assert_eq!(seen.len(), (PRODUCERS * PER_PRODUCER) as usize);

    // Events from each producer arrive in publication order.
    let mut next_expected = [0u64; PRODUCERS as usize];
    for &(producer_id, i) in seen.iter() {
        assert_eq!(i, next_expected[producer_id as usize]);
        next_expected[producer_id as usize] += 1;
    }
    assert!(next_expected.iter().all(|&n| n == PER_PRODUCER));
}

#[test]
fn backpressure_blocks_producer_until_consumer_frees_slots() {
    let ring = Arc::new(RingBuffer::single_producer(8, BusySpinWaitStrategy, || 0i64).unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let processor = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[]),
        Recorder { seen: seen.clone(), delay: Some(Duration::from_millis(1)) },
    );
    ring.add_gating_sequences(&[processor.sequence()]);
    let consumer = processor.spawn();

    for value in 0..64i64 {
        ring.publish_with(|slot| *slot = value).unwrap();
    }
    ring.drain();
    consumer.halt();
    consumer.join();

    // The slow consumer forced the producer to wait; nothing was lost or
    // reordered.
    assert_eq!(*seen.lock(), (0..64).collect::<Vec<_>>());
}

#[test]
fn backpressure_try_next_reports_full_ring() {
    let ring = Arc::new(RingBuffer::single_producer(8, BusySpinWaitStrategy, || 0i64).unwrap());
    let gate = Arc::new(torus::AtomicSequence::default());
    ring.add_gating_sequences(&[gate.clone()]);

    for value in 0..8i64 {
        ring.publish_with(|slot| *slot = value).unwrap();
    }
    assert!(ring.try_next().is_err());

    // Consuming a single event frees exactly one slot.
    gate.set(0);
    let sequence = ring.try_next().unwrap();
    assert_eq!(sequence, 8);
    ring.publish(sequence);
    assert!(ring.try_next().is_err());
}

#[test]
fn halt_releases_blocked_consumer_quickly() {
    let ring =
        Arc::new(RingBuffer::single_producer(16, BlockingWaitStrategy::new(), || 0i64).unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let processor = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[]),
        Recorder { seen: seen.clone(), delay: None },
    );
    ring.add_gating_sequences(&[processor.sequence()]);
    let consumer = processor.spawn();

    for value in 0..5i64 {
        ring.publish_with(|slot| *slot = value).unwrap();
    }
    ring.drain();
    assert_eq!(consumer.sequence().get(), 4);

    // The consumer is now parked waiting for sequence 5.
    let start = Instant::now();
    consumer.halt();
    while consumer.is_running() {
        assert!(
            start.elapsed() < Duration::from_millis(100),
            "consumer did not observe the alert in time"
        );
        thread::yield_now();
    }
    assert_eq!(consumer.sequence().get(), 4);
    consumer.join();
}

#[test]
fn dependent_stage_never_overtakes_upstream() {
    struct Tracker {
        upstream: Arc<torus::AtomicSequence>,
        max_lead: Arc<Mutex<Sequence>>,
    }

    impl EventHandler<i64> for Tracker {
        fn on_event(
            &mut self,
            _event: &i64,
            sequence: Sequence,
            _end_of_batch: bool,
        ) -> Result<(), EventError> {
            // By the time this stage sees `sequence`, the upstream stage
            // must already have released it.
            let upstream = self.upstream.get();
            let mut max_lead = self.max_lead.lock();
            *max_lead = (*max_lead).max(sequence - upstream);
            Ok(())
        }
    }

    let ring = Arc::new(RingBuffer::single_producer(32, BusySpinWaitStrategy, || 0i64).unwrap());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let first = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[]),
        Recorder { seen: seen.clone(), delay: None },
    );
    let first_sequence = first.sequence();

    let max_lead = Arc::new(Mutex::new(Sequence::MIN));
    let second = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[first_sequence.clone()]),
        Tracker { upstream: first_sequence, max_lead: max_lead.clone() },
    );

    // Only the final stage gates the producers.
    ring.add_gating_sequences(&[second.sequence()]);
    let first = first.spawn();
    let second = second.spawn();

    for value in 0..5000i64 {
        ring.publish_with(|slot| *slot = value).unwrap();
    }
    ring.drain();
    first.halt();
    second.halt();
    first.join();
    second.join();

    assert_eq!(seen.lock().len(), 5000);
    assert!(*max_lead.lock() <= 0, "downstream stage overtook upstream");
}
