//! Producer/consumer throughput benchmarks.
//!
//! Run: cargo bench --bench bench_throughput

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

use torus::wait::{BusySpinWaitStrategy, YieldingWaitStrategy};
use torus::{BatchEventProcessor, EventError, EventHandler, RingBuffer, Sequence};

const RING_SIZE: usize = 64 * 1024;
const BATCH_SIZE: i64 = 64;
const TOTAL_EVENTS: i64 = 1_000_000;

struct Blackhole;

impl EventHandler<i64> for Blackhole {
    fn on_event(
        &mut self,
        event: &i64,
        _sequence: Sequence,
        _end_of_batch: bool,
    ) -> Result<(), EventError> {
        std::hint::black_box(*event);
        Ok(())
    }
}

/// Single producer publishing one event per claim.
fn run_spsc(events: i64) {
    let ring = Arc::new(RingBuffer::single_producer(RING_SIZE, BusySpinWaitStrategy, || 0i64).unwrap());
    let processor = BatchEventProcessor::new(ring.clone(), ring.new_barrier(&[]), Blackhole);
    ring.add_gating_sequences(&[processor.sequence()]);
    let consumer = processor.spawn();

    for value in 0..events {
        ring.publish_with(|slot| *slot = value).unwrap();
    }
    ring.drain();
    consumer.halt();
    consumer.join();
}

/// Single producer claiming and publishing in batches.
fn run_spsc_batch(events: i64) {
    let ring = Arc::new(RingBuffer::single_producer(RING_SIZE, BusySpinWaitStrategy, || 0i64).unwrap());
    let processor = BatchEventProcessor::new(ring.clone(), ring.new_barrier(&[]), Blackhole);
    ring.add_gating_sequences(&[processor.sequence()]);
    let consumer = processor.spawn();

    let mut published = 0;
    while published < events {
        let batch = BATCH_SIZE.min(events - published);
        ring.publish_batch_with(batch, |slot, seq| *slot = seq).unwrap();
        published += batch;
    }
    ring.drain();
    consumer.halt();
    consumer.join();
}

/// Two producers racing claims into one consumer.
fn run_mpsc(events: i64) {
    let ring = Arc::new(
        RingBuffer::multi_producer(RING_SIZE, YieldingWaitStrategy::new(), || 0i64).unwrap(),
    );
    let processor = BatchEventProcessor::new(ring.clone(), ring.new_barrier(&[]), Blackhole);
    ring.add_gating_sequences(&[processor.sequence()]);
    let consumer = processor.spawn();

    let per_producer = events / 2;
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let ring = ring.clone();
            thread::spawn(move || {
                for value in 0..per_producer {
                    ring.publish_with(|slot| *slot = value).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    ring.drain();
    consumer.halt();
    consumer.join();
}

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.throughput(Throughput::Elements(TOTAL_EVENTS as u64));
    group.sample_size(10);

    group.bench_function(BenchmarkId::new("spsc", TOTAL_EVENTS), |b| {
        b.iter(|| run_spsc(TOTAL_EVENTS));
    });
    group.bench_function(BenchmarkId::new("spsc_batch", TOTAL_EVENTS), |b| {
        b.iter(|| run_spsc_batch(TOTAL_EVENTS));
    });
    group.bench_function(BenchmarkId::new("mpsc_2p", TOTAL_EVENTS), |b| {
        b.iter(|| run_mpsc(TOTAL_EVENTS));
    });

    group.finish();
}

criterion_group!(benches, bench_throughput);
criterion_main!(benches);
