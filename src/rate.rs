//! Edit-rate sampling.
//!
//! [`RateCounter`] is meant to be installed as a watcher's `on_edit` callback.
//! It counts edits and, each time an interval has elapsed, pushes a
//! [`RateSample`] onto a bounded channel. The consumer reads samples from the
//! paired [`RateReceiver`] on its own schedule.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::Event;
use crate::watch::CallbackResult;

/// Default sampling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Samples kept in the moving average.
pub const WINDOW_LEN: usize = 10;

const SAMPLE_CAPACITY: usize = 64;

/// One edit-rate measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    /// When the sample was taken.
    pub at: DateTime<Utc>,
    /// Edits per minute over the last interval.
    pub edits_per_minute: f64,
    /// Mean of the last [`WINDOW_LEN`] per-minute rates, this one included.
    pub average_per_minute: f64,
    /// Raw edit count over the last interval.
    pub edits_in_interval: u64,
}

/// Counts edits and emits a [`RateSample`] every interval.
#[derive(Debug)]
pub struct RateCounter {
    interval: Duration,
    count: u64,
    started: Option<Instant>,
    window: VecDeque<f64>,
    tx: Sender<RateSample>,
    dropped: Arc<AtomicU64>,
}

impl RateCounter {
    /// Create a counter and the receiver its samples arrive on.
    ///
    /// A zero interval is raised to one millisecond.
    #[must_use]
    pub fn new(interval: Duration) -> (Self, RateReceiver) {
        let (tx, rx) = bounded(SAMPLE_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        let counter = Self {
            interval: interval.max(Duration::from_millis(1)),
            count: 0,
            started: None,
            window: VecDeque::with_capacity(WINDOW_LEN + 1),
            tx,
            dropped: Arc::clone(&dropped),
        };
        (counter, RateReceiver { rx, dropped })
    }

    /// Length of one sampling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Count one edit observed now.
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Count one edit observed at `now`.
    ///
    /// If a full interval has passed since the current one started, the edits
    /// counted so far are sampled first and `now` starts the next interval.
    pub fn record_at(&mut self, now: Instant) {
        let started = *self.started.get_or_insert(now);
        if now.saturating_duration_since(started) >= self.interval {
            self.sample();
            self.started = Some(now);
        }
        self.count += 1;
    }

    fn sample(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let edits_per_minute = self.count as f64 * (60.0 / self.interval.as_secs_f64());
        self.window.push_back(edits_per_minute);
        if self.window.len() > WINDOW_LEN {
            self.window.pop_front();
        }
        #[allow(clippy::cast_precision_loss)]
        let average_per_minute = self.window.iter().sum::<f64>() / self.window.len() as f64;

        let sample = RateSample {
            at: Utc::now(),
            edits_per_minute,
            average_per_minute,
            edits_in_interval: self.count,
        };
        self.count = 0;

        match self.tx.try_send(sample) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "rate sample queue full; dropping sample");
            }
        }
    }

    /// Turn the counter into an `on_edit` callback.
    pub fn into_callback(mut self) -> impl FnMut(&Event) -> CallbackResult + Send + 'static {
        move |_: &Event| {
            self.record();
            Ok(())
        }
    }
}

/// Consumer side of a [`RateCounter`].
#[derive(Debug, Clone)]
pub struct RateReceiver {
    rx: Receiver<RateSample>,
    dropped: Arc<AtomicU64>,
}

impl RateReceiver {
    /// Next sample if one is ready.
    #[must_use]
    pub fn try_recv(&self) -> Option<RateSample> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next sample.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RateSample> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Samples discarded because the consumer fell behind.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sample_before_interval() {
        let (mut counter, rx) = RateCounter::new(Duration::from_secs(10));
        let t0 = Instant::now();
        for i in 0..5 {
            counter.record_at(t0 + Duration::from_secs(i));
        }
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_sample_scales_to_per_minute() {
        let (mut counter, rx) = RateCounter::new(Duration::from_secs(10));
        let t0 = Instant::now();
        for _ in 0..7 {
            counter.record_at(t0);
        }
        counter.record_at(t0 + Duration::from_secs(10));

        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.edits_in_interval, 7);
        assert!((sample.edits_per_minute - 42.0).abs() < f64::EPSILON);
        assert!((sample.average_per_minute - 42.0).abs() < f64::EPSILON);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_average_over_window() {
        let (mut counter, rx) = RateCounter::new(Duration::from_secs(60));
        let mut now = Instant::now();
        counter.record_at(now);
        // Interval n holds n edits, so rates run 1, 2, 3, ...
        let mut last = None;
        for n in 1..=12u64 {
            for _ in 1..n {
                counter.record_at(now);
            }
            now += Duration::from_secs(60);
            counter.record_at(now);
            last = rx.try_recv();
            assert_eq!(last.as_ref().unwrap().edits_in_interval, n);
        }
        // Window holds rates 3..=12.
        let last = last.unwrap();
        assert!((last.average_per_minute - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (mut counter, rx) = RateCounter::new(Duration::from_millis(1));
        let mut now = Instant::now();
        counter.record_at(now);
        for _ in 0..SAMPLE_CAPACITY + 3 {
            now += Duration::from_millis(1);
            counter.record_at(now);
        }
        assert_eq!(rx.dropped(), 3);
        assert_eq!(rx.rx.len(), SAMPLE_CAPACITY);
    }

    #[test]
    fn test_callback_counts_edits() {
        let (counter, rx) = RateCounter::new(Duration::from_secs(3600));
        let mut callback = counter.into_callback();
        let event = Event::default();
        for _ in 0..3 {
            callback(&event).unwrap();
        }
        assert!(rx.try_recv().is_none());
        assert_eq!(rx.dropped(), 0);
    }
}
