//! Wait strategies for consumers observing the cursor.
//!
//! - `BusySpinWaitStrategy` - tight load loop, lowest latency
//! - `YieldingWaitStrategy` - spin a while, then yield the thread
//! - `SleepingWaitStrategy` - spin, yield, then sleep with growing backoff
//! - `BlockingWaitStrategy` - condvar on cursor progress, wakes on publish
//! - `TimeoutBlockingWaitStrategy` - blocking with an overall deadline
//!
//! A strategy waits until the cursor AND the dependent sequences have all
//! reached the target, checking the alert probe as it goes. Cancellation is
//! the alert flag plus `signal_all_when_blocking` to wake sleepers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, TorusError};
use crate::sequence::{minimum_sequence, AtomicSequence, Sequence};

/// Outcome of a completed (non-alerted) wait.
pub struct WaitResult {
    /// The effective available sequence: the minimum of the cursor and the
    /// dependent sequences at the final observation. On the timeout path
    /// this may still be below the requested target.
    pub available: Sequence,
    /// Whether the cursor itself was observed beyond the target. Purely a
    /// hint; callers may ignore it.
    pub cursor_passed_target: bool,
}

/// Protocol for waiting until a target sequence becomes available.
pub trait WaitStrategy: Send + Sync {
    /// Block, spin or sleep until both the cursor and the dependent
    /// sequences have reached `sequence`, or the alert probe fires.
    ///
    /// Timeout-capable strategies may return early with
    /// `WaitResult::available < sequence`; every other strategy returns a
    /// value at or beyond the target, or `TorusError::Alerted`.
    fn wait_for(
        &self,
        sequence: Sequence,
        cursor: &AtomicSequence,
        dependents: &[Arc<AtomicSequence>],
        alerted: &AtomicBool,
    ) -> Result<WaitResult>;

    /// Wake any thread parked in a blocking wait. No-op for polling
    /// strategies.
    fn signal_all_when_blocking(&self) {}
}

/// Effective available sequence: the slowest of the cursor and every
/// dependent sequence.
#[inline]
fn observe(cursor: &AtomicSequence, dependents: &[Arc<AtomicSequence>]) -> Sequence {
    cursor
        .get()
        .min(minimum_sequence(dependents, Sequence::MAX))
}

#[inline]
fn completed(sequence: Sequence, available: Sequence, cursor: &AtomicSequence) -> WaitResult {
    debug_assert!(available >= sequence);
    WaitResult {
        available,
        cursor_passed_target: cursor.get() > sequence,
    }
}

/// Pure polling loop. Burns a core; use only when latency matters more than
/// anything else.
#[derive(Debug, Default)]
pub struct BusySpinWaitStrategy;

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: Sequence,
        cursor: &AtomicSequence,
        dependents: &[Arc<AtomicSequence>],
        alerted: &AtomicBool,
    ) -> Result<WaitResult> {
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alerted);
            }
            let available = observe(cursor, dependents);
            if available >= sequence {
                return Ok(completed(sequence, available, cursor));
            }
            std::hint::spin_loop();
        }
    }
}

/// Spin a bounded number of times, then yield to the scheduler on every
/// further miss.
#[derive(Debug)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    pub fn new() -> Self {
        YieldingWaitStrategy { spin_tries: 100 }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: Sequence,
        cursor: &AtomicSequence,
        dependents: &[Arc<AtomicSequence>],
        alerted: &AtomicBool,
    ) -> Result<WaitResult> {
        let mut counter = self.spin_tries;
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alerted);
            }
            let available = observe(cursor, dependents);
            if available >= sequence {
                return Ok(completed(sequence, available, cursor));
            }
            if counter > 0 {
                counter -= 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }
}

/// Spin, then yield, then park with a doubling sleep. Trades wake-up latency
/// for a mostly idle core.
#[derive(Debug)]
pub struct SleepingWaitStrategy {
    retries: u32,
    max_sleep: Duration,
}

impl SleepingWaitStrategy {
    pub fn new() -> Self {
        SleepingWaitStrategy {
            retries: 200,
            max_sleep: Duration::from_micros(128),
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: Sequence,
        cursor: &AtomicSequence,
        dependents: &[Arc<AtomicSequence>],
        alerted: &AtomicBool,
    ) -> Result<WaitResult> {
        let mut counter = self.retries;
        let mut sleep = Duration::from_micros(1);
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alerted);
            }
            let available = observe(cursor, dependents);
            if available >= sequence {
                return Ok(completed(sequence, available, cursor));
            }
            if counter > 100 {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                std::thread::yield_now();
            } else {
                std::thread::sleep(sleep);
                sleep = (sleep * 2).min(self.max_sleep);
            }
        }
    }
}

/// Park on a condition variable until the cursor advances, then busy-read
/// the dependent sequences. Producers signal on publish.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    lock: Mutex<()>,
    cond: Condvar,
}

/// Upper bound on a single park so an alert is observed even if a wake-up
/// signal is lost.
const PARK_SLICE: Duration = Duration::from_millis(1);

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: Sequence,
        cursor: &AtomicSequence,
        dependents: &[Arc<AtomicSequence>],
        alerted: &AtomicBool,
    ) -> Result<WaitResult> {
        if cursor.get() < sequence {
            let mut guard = self.lock.lock();
            while cursor.get() < sequence {
                if alerted.load(Ordering::Acquire) {
                    return Err(TorusError::Alerted);
                }
                self.cond.wait_for(&mut guard, PARK_SLICE);
            }
        }

        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alerted);
            }
            let available = observe(cursor, dependents);
            if available >= sequence {
                return Ok(completed(sequence, available, cursor));
            }
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }
}

/// `BlockingWaitStrategy` with an overall deadline. A wait that exceeds the
/// deadline returns the current effective available sequence, which the
/// caller will see is below the target.
#[derive(Debug)]
pub struct TimeoutBlockingWaitStrategy {
    lock: Mutex<()>,
    cond: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    pub fn new(timeout: Duration) -> Self {
        TimeoutBlockingWaitStrategy {
            lock: Mutex::new(()),
            cond: Condvar::new(),
            timeout,
        }
    }

    fn timed_out(&self, cursor: &AtomicSequence, dependents: &[Arc<AtomicSequence>]) -> WaitResult {
        WaitResult {
            available: observe(cursor, dependents),
            cursor_passed_target: false,
        }
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: Sequence,
        cursor: &AtomicSequence,
        dependents: &[Arc<AtomicSequence>],
        alerted: &AtomicBool,
    ) -> Result<WaitResult> {
        let deadline = Instant::now() + self.timeout;

        if cursor.get() < sequence {
            let mut guard = self.lock.lock();
            while cursor.get() < sequence {
                if alerted.load(Ordering::Acquire) {
                    return Err(TorusError::Alerted);
                }
                let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero()) else {
                    return Ok(self.timed_out(cursor, dependents));
                };
                self.cond.wait_for(&mut guard, remaining.min(PARK_SLICE));
            }
        }

        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(TorusError::Alerted);
            }
            let available = observe(cursor, dependents);
            if available >= sequence {
                return Ok(completed(sequence, available, cursor));
            }
            if Instant::now() >= deadline {
                return Ok(self.timed_out(cursor, dependents));
            }
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }
}
