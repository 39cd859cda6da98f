use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Virtual time in nanoseconds since the Unix epoch.
pub type Timestamp = u64;

pub(crate) const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Time oracle for the limiter.
///
/// `after` hands back a one-shot channel that delivers the wakeup timestamp
/// once `duration` of virtual time has elapsed from the call. Senders never
/// block; the receiver should be awaited promptly.
pub trait Clock: Send + Sync {
    /// Current virtual time.
    fn now(&self) -> Timestamp;

    /// One-shot wakeup after `duration` of virtual time.
    fn after(&self, duration: Duration) -> oneshot::Receiver<Timestamp>;
}

/// Wall-clock [`Clock`] used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0)
    }

    /// Spawns a timer task; requires a running Tokio runtime.
    fn after(&self, duration: Duration) -> oneshot::Receiver<Timestamp> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(SystemClock.now());
        });
        rx
    }
}

/// Manually-advanced [`Clock`] for deterministic tests.
///
/// Clones share the same time: hand one clone to the limiter and keep another
/// to drive [`TestClock::forward`]. Sleepers registered through
/// [`Clock::after`] are woken by exactly the `forward` call that crosses
/// their wake-up time, including crossings reached over several calls.
#[derive(Clone)]
pub struct TestClock {
    inner: Arc<Mutex<TestClockInner>>,
}

struct TestClockInner {
    now: Timestamp,
    waiters: Vec<Waiter>,
}

struct Waiter {
    wake_at: Timestamp,
    notify: oneshot::Sender<Timestamp>,
}

impl TestClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TestClockInner {
                now: start,
                waiters: Vec::new(),
            })),
        }
    }

    /// Advance virtual time by `duration` and wake every sleeper whose
    /// wake-up time has been crossed.
    pub fn forward(&self, duration: Duration) {
        let due = {
            let mut inner = self.inner.lock();
            inner.now = inner.now.saturating_add(duration_to_nanos(duration));
            let now = inner.now;
            let waiters = std::mem::take(&mut inner.waiters);
            let (due, pending): (Vec<_>, Vec<_>) = waiters
                .into_iter()
                .filter(|waiter| !waiter.notify.is_closed())
                .partition(|waiter| waiter.wake_at <= now);
            inner.waiters = pending;
            due
        };

        // Deliver outside the mutex; one-shot sends never block.
        for waiter in due {
            let _ = waiter.notify.send(waiter.wake_at);
        }
    }

    /// Number of sleepers currently parked on this clock.
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        self.inner.lock().now
    }

    fn after(&self, duration: Duration) -> oneshot::Receiver<Timestamp> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        let wake_at = inner.now.saturating_add(duration_to_nanos(duration));
        if duration.is_zero() {
            // Boundary waits resolve immediately instead of parking.
            let _ = tx.send(wake_at);
            return rx;
        }
        inner.waiters.push(Waiter { wake_at, notify: tx });
        rx
    }
}

pub(crate) fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
