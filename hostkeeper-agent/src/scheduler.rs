//! Wall-clock aligned cycle scheduler
//!
//! One cycle at start-up, then one on every multiple of the interval in
//! local time (10:00, 10:05, ... for five minutes). A cycle that overruns a
//! tick makes the scheduler skip it rather than run two back to back.

use crate::monitor::Monitor;
use chrono::{DateTime, FixedOffset, Local};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Scheduler {
    monitor: Arc<Monitor>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(monitor: Arc<Monitor>, interval: Duration) -> Self {
        Self { monitor, interval }
    }

    /// Run cycles until `shutdown` resolves
    ///
    /// Shutdown also interrupts a cycle in flight; the state file is only
    /// ever replaced whole, so an interrupted commit leaves the previous one.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Scheduler started, interval {:?}", self.interval);

        loop {
            tokio::select! {
                report = self.monitor.run_cycle() => {
                    if !report.persisted {
                        warn!(cycle = %report.cycle_id, "Cycle state was not persisted");
                    }
                }
                _ = &mut shutdown => break,
            }

            let now: DateTime<FixedOffset> = Local::now().into();
            let tick = next_aligned_tick(now, self.interval);
            let wait = (tick - now).to_std().unwrap_or(Duration::ZERO);
            debug!("Next cycle at {} (in {:?})", tick.format("%H:%M:%S"), wait);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => break,
            }
        }

        info!("Shutdown requested, scheduler stopped");
    }
}

/// First multiple of `interval` (counted from local midnight) after `now`
pub fn next_aligned_tick(now: DateTime<FixedOffset>, interval: Duration) -> DateTime<FixedOffset> {
    let step = interval.as_secs().max(1) as i64;
    let offset = i64::from(now.offset().local_minus_utc());

    let local_secs = now.timestamp() + offset;
    let next_local = (local_secs.div_euclid(step) + 1) * step;

    DateTime::from_timestamp(next_local - offset, 0)
        .map(|tick| tick.with_timezone(now.offset()))
        .unwrap_or_else(|| now + chrono::Duration::seconds(step))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    #[test]
    fn test_aligns_to_next_multiple() {
        let tick = next_aligned_tick(at("2024-03-01T10:02:17+01:00"), FIVE_MINUTES);
        assert_eq!(tick, at("2024-03-01T10:05:00+01:00"));
    }

    #[test]
    fn test_exact_tick_moves_to_following_one() {
        let tick = next_aligned_tick(at("2024-03-01T10:05:00+01:00"), FIVE_MINUTES);
        assert_eq!(tick, at("2024-03-01T10:10:00+01:00"));
    }

    #[test]
    fn test_subsecond_past_tick() {
        let tick = next_aligned_tick(at("2024-03-01T10:04:59.900+00:00"), FIVE_MINUTES);
        assert_eq!(tick, at("2024-03-01T10:05:00+00:00"));
    }

    #[test]
    fn test_alignment_uses_local_offset() {
        // 45-minute offsets must still land on :00/:05 local
        let tick = next_aligned_tick(at("2024-03-01T10:01:00+05:45"), FIVE_MINUTES);
        assert_eq!(tick, at("2024-03-01T10:05:00+05:45"));
    }

    #[test]
    fn test_overrun_skips_missed_ticks() {
        // a cycle that ended at 10:11 waits for 10:15, not 10:05 or 10:10
        let tick = next_aligned_tick(at("2024-03-01T10:11:30+00:00"), FIVE_MINUTES);
        assert_eq!(tick, at("2024-03-01T10:15:00+00:00"));
    }

    #[test]
    fn test_crosses_midnight() {
        let tick = next_aligned_tick(at("2024-03-01T23:58:00+02:00"), FIVE_MINUTES);
        assert_eq!(tick, at("2024-03-02T00:00:00+02:00"));
    }
}
