//! Periodic drivers: fixed-interval cache refresh and a daily wall-clock trigger.

use crate::core::cache::RateCache;
use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Next occurrence of local time `at` strictly after `now`, in `now`'s zone.
///
/// Local times skipped by a DST jump move forward one hour; repeated local
/// times resolve to the earlier instant.
pub fn next_daily_fire<Z: TimeZone>(now: &DateTime<Z>, at: NaiveTime) -> DateTime<Z> {
    let tz = now.timezone();
    let localize = |naive: NaiveDateTime| {
        tz.from_local_datetime(&naive)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
    };

    now.date_naive()
        .iter_days()
        .take(3)
        .filter_map(|day| localize(day.and_time(at)))
        .find(|candidate| candidate > now)
        .unwrap_or_else(|| now.clone() + TimeDelta::days(1))
}

#[derive(Debug, Clone)]
pub struct DailySchedule {
    pub at: NaiveTime,
    pub timezone: Tz,
}

impl DailySchedule {
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        next_daily_fire(&now.with_timezone(&self.timezone), self.at)
    }
}

/// Refreshes the cache every `period` until cancelled. The first refresh
/// happens one period after start. A refresh in progress is allowed to
/// finish before the loop observes cancellation.
pub async fn run_refresh_loop(cache: RateCache, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_secs = period.as_secs(), "Refresh loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match cache.refresh_now().await {
                    Ok(snapshot) => info!(
                        updated = %snapshot.fetched_at.format("%H:%M:%S"),
                        "Periodic refresh succeeded"
                    ),
                    Err(e) => error!(error = %e, "Periodic refresh failed"),
                }
            }
        }
    }
    info!("Refresh loop stopped");
}

/// Sleeps until each next daily occurrence and runs `fire`, recomputing the
/// target from the wall clock on every iteration.
pub async fn run_daily<F, Fut>(schedule: DailySchedule, cancel: CancellationToken, mut fire: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let now = Utc::now();
        let next = schedule.next_after(now);
        let wait = (next.with_timezone(&Utc) - now).to_std().unwrap_or_default();
        info!(
            next = %next.format("%Y-%m-%d %H:%M %Z"),
            wait_secs = wait.as_secs(),
            "Next daily notification scheduled"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        fire().await;
    }
    info!("Daily trigger stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CachePolicy;
    use crate::core::currency::Currency;
    use crate::core::rates::{RateSource, RateTable};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Timelike};
    use chrono_tz::{America::New_York, Asia::Tashkent};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn local<Z: TimeZone>(tz: &Z, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Z> {
        tz.from_local_datetime(
            &NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, mi, 0)
                .unwrap(),
        )
        .earliest()
        .unwrap()
    }

    #[test]
    fn test_after_fire_time_rolls_to_next_day() {
        let now = local(&Tashkent, 2024, 3, 10, 8, 0);
        let next = next_daily_fire(&now, at(7, 30));
        assert_eq!(next, local(&Tashkent, 2024, 3, 11, 7, 30));
    }

    #[test]
    fn test_before_fire_time_stays_on_same_day() {
        let now = local(&Tashkent, 2024, 3, 10, 7, 0);
        let next = next_daily_fire(&now, at(7, 30));
        assert_eq!(next, local(&Tashkent, 2024, 3, 10, 7, 30));
    }

    #[test]
    fn test_exact_fire_time_schedules_tomorrow() {
        let now = local(&Tashkent, 2024, 12, 31, 7, 30);
        let next = next_daily_fire(&now, at(7, 30));
        assert_eq!(next, local(&Tashkent, 2025, 1, 1, 7, 30));
    }

    #[test]
    fn test_schedule_converts_from_utc() {
        let schedule = DailySchedule {
            at: at(7, 30),
            timezone: Tashkent,
        };
        // 03:00 UTC is 08:00 in Tashkent (UTC+5)
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 3, 0, 0).unwrap();
        let next = schedule.next_after(now);
        assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 3, 11, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_dst_gap_moves_forward() {
        // 02:30 does not exist in New York on 2024-03-10
        let now = local(&New_York, 2024, 3, 10, 0, 0);
        let next = next_daily_fire(&now, at(2, 30));
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!((next.hour(), next.minute()), (3, 30));
    }

    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl RateSource for CountingSource {
        async fn fetch(&self) -> Result<RateTable> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RateTable::new([(Currency::Usd, 12700.0)]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_ticks_until_cancelled() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let cache = RateCache::new(Arc::clone(&source) as Arc<dyn RateSource>, CachePolicy::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_refresh_loop(
            cache.clone(),
            Duration::from_secs(300),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(602)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 3);

        cancel.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_trigger_fires_and_stops() {
        let fired = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let schedule = DailySchedule {
            at: at(7, 30),
            timezone: Tashkent,
        };

        let counter = Arc::clone(&fired);
        let token = cancel.clone();
        run_daily(schedule, cancel.clone(), move || {
            let counter = Arc::clone(&counter);
            let token = token.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                token.cancel();
            }
        })
        .await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_daily_trigger_cancelled_before_first_fire() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let schedule = DailySchedule {
            at: at(7, 30),
            timezone: Tashkent,
        };
        let mut fired = 0;
        run_daily(schedule, cancel, || {
            fired += 1;
            async {}
        })
        .await;
        assert_eq!(fired, 0);
    }
}
