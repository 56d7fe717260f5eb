//! Per-client pacing
//!
//! Two modes, picked per trace line:
//!
//! - **Target rate**: keep the client's byte rate at its share of the
//!   aggregate MB/sec budget. Running ahead means sleeping off the surplus;
//!   running behind records the deficit as scheduling latency. A rate of 0
//!   never sleeps and always records.
//! - **Trace relative**: the line carries a target elapsed time. Ahead of it
//!   we sleep, behind it the overrun becomes latency.
//!
//! The decisions are pure so they can be checked against a virtual clock;
//! the replay loop performs the sleep and stores the latency.

use std::time::{Duration, Instant};

/// Outcome of one pacing decision.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pace {
    pub sleep: Option<Duration>,
    pub latency: Option<Duration>,
}

impl Pace {
    fn none() -> Self {
        Self::default()
    }

    fn sleep(d: Duration) -> Self {
        Self {
            sleep: Some(d),
            latency: None,
        }
    }

    fn late(d: Duration) -> Self {
        Self {
            sleep: None,
            latency: Some(d),
        }
    }
}

/// Seconds to a `Duration`, saturating at `Duration::MAX`.
fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(if s > 0.0 { Duration::MAX } else { Duration::ZERO })
}

#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    at: Instant,
    bytes: u64,
}

/// Target-rate state of one client.
#[derive(Debug, Clone)]
pub struct RatePacer {
    /// MB/sec owned by this client
    rate: f64,
    checkpoint: Option<Checkpoint>,
}

impl RatePacer {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            checkpoint: None,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Forget the baseline; the next call calibrates again.
    pub fn reset(&mut self) {
        self.checkpoint = None;
    }

    /// Decide for a client that has moved `bytes` in total at `now`.
    pub fn pace(&mut self, bytes: u64, now: Instant) -> Pace {
        let Some(cp) = self.checkpoint else {
            self.checkpoint = Some(Checkpoint { at: now, bytes });
            return Pace::none();
        };

        let elapsed = now.saturating_duration_since(cp.at).as_secs_f64();
        let tdelay = if self.rate > 0.0 {
            bytes.saturating_sub(cp.bytes) as f64 / (1.0e6 * self.rate) - elapsed
        } else {
            -elapsed
        };

        let pace = if tdelay > 0.0 && self.rate > 0.0 {
            Pace::sleep(secs(tdelay))
        } else {
            Pace::late(secs(-tdelay))
        };

        // The next interval starts once the sleep is over.
        let at = pace
            .sleep
            .and_then(|d| now.checked_add(d))
            .unwrap_or(now);
        self.checkpoint = Some(Checkpoint {
            at,
            bytes,
        });
        pace
    }
}

/// Trace-relative decision: `target` and `elapsed` are seconds since the
/// client's phase start. Behind schedule only reports an overrun larger
/// than `max_latency`.
pub fn time_delay(target: f64, elapsed: Duration, max_latency: Duration) -> Pace {
    let elapsed = elapsed.as_secs_f64();
    if !target.is_finite() || target < 0.0 {
        return Pace::none();
    }
    if target > elapsed {
        Pace::sleep(secs(target - elapsed))
    } else {
        let overrun = secs(elapsed - target);
        if overrun > max_latency {
            Pace::late(overrun)
        } else {
            Pace::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_calibrates() {
        let mut p = RatePacer::new(10.0);
        let t0 = Instant::now();
        assert_eq!(p.pace(0, t0), Pace::none());
        p.reset();
        assert_eq!(p.pace(1_000_000, t0 + Duration::from_secs(5)), Pace::none());
    }

    #[test]
    fn test_ahead_of_schedule_sleeps() {
        // 1 MB/s, 1 MB moved in 0.25 s -> 0.75 s early
        let mut p = RatePacer::new(1.0);
        let t0 = Instant::now();
        p.pace(0, t0);
        let pace = p.pace(1_000_000, t0 + Duration::from_millis(250));
        let sleep = pace.sleep.expect("should sleep");
        assert!((sleep.as_secs_f64() - 0.75).abs() < 1e-6);
        assert!(pace.latency.is_none());
    }

    #[test]
    fn test_behind_schedule_records_latency() {
        let mut p = RatePacer::new(1.0);
        let t0 = Instant::now();
        p.pace(0, t0);
        let pace = p.pace(100_000, t0 + Duration::from_millis(500));
        assert!(pace.sleep.is_none());
        let late = pace.latency.expect("should be late");
        assert!((late.as_secs_f64() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_zero_rate_never_sleeps() {
        let mut p = RatePacer::new(0.0);
        let mut now = Instant::now();
        let mut bytes = 0;
        for _ in 0..1000 {
            let pace = p.pace(bytes, now);
            assert!(pace.sleep.is_none());
            bytes += 65536;
            now += Duration::from_micros(50);
        }
    }

    #[test]
    fn test_rate_converges() {
        // Virtual clock: every op moves 64 KiB and takes 100 us of real work.
        let rate = 5.0;
        let chunk = 65536u64;
        let op_time = Duration::from_micros(100);

        let mut p = RatePacer::new(rate);
        let start = Instant::now();
        let mut now = start;
        let mut bytes = 0u64;
        for _ in 0..2000 {
            if let Some(s) = p.pace(bytes, now).sleep {
                now += s;
            }
            now += op_time;
            bytes += chunk;
        }
        let secs = now.duration_since(start).as_secs_f64();
        let achieved = bytes as f64 / 1.0e6 / secs;
        // Never more than one op ahead of the budget.
        let quantum = chunk as f64 / 1.0e6 / secs;
        assert!(achieved <= rate + quantum, "achieved {} > {}", achieved, rate);
        assert!(achieved > rate * 0.95, "achieved {} too slow", achieved);
    }

    #[test]
    fn test_time_delay() {
        let ahead = time_delay(2.0, Duration::from_millis(1500), Duration::ZERO);
        assert!((ahead.sleep.unwrap().as_secs_f64() - 0.5).abs() < 1e-9);

        let behind = time_delay(1.0, Duration::from_millis(1300), Duration::from_millis(100));
        assert!((behind.latency.unwrap().as_secs_f64() - 0.3).abs() < 1e-9);

        // Overrun smaller than the recorded maximum is not reported.
        let small = time_delay(1.0, Duration::from_millis(1050), Duration::from_millis(100));
        assert_eq!(small, Pace::none());

        assert_eq!(time_delay(f64::NAN, Duration::ZERO, Duration::ZERO), Pace::none());
    }

    #[test]
    fn test_tiny_rate_saturates() {
        let mut p = RatePacer::new(1e-300);
        let t0 = Instant::now();
        p.pace(0, t0);
        let pace = p.pace(65536, t0 + Duration::from_millis(1));
        assert_eq!(pace.sleep, Some(Duration::MAX));
        // Baseline stays usable after an unrepresentable sleep.
        let next = p.pace(65536, t0 + Duration::from_millis(2));
        assert!(next.sleep.is_some() || next.latency.is_some());

        let far = time_delay(1e300, Duration::ZERO, Duration::ZERO);
        assert_eq!(far.sleep, Some(Duration::MAX));
    }
}
