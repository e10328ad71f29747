//! Time source for the polling loops.
//!
//! Deploy stabilisation and task monitoring sleep for tens of seconds
//! between status checks. They go through [`Clock`] so tests can run a
//! ten-minute timeout in microseconds with [`ManualClock`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current Unix time in seconds.
    fn now_epoch_secs(&self) -> u64;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time and real tokio sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual time. `sleep` returns immediately after advancing the clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_millis: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start_epoch_secs: u64) -> Self {
        Self {
            now_millis: AtomicU64::new(start_epoch_secs * 1000),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now_millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Every sleep taken so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("sleeps lock").clone()
    }

    /// Total virtual time spent sleeping.
    pub fn slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_epoch_secs(&self) -> u64 {
        self.now_millis.load(Ordering::SeqCst) / 1000
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("sleeps lock").push(duration);
        self.advance(duration);
    }
}
