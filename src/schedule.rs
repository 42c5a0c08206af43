use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use tracing::{error, info};

use crate::dates;
use crate::pipeline::Pipeline;

pub const RUN_WEEKDAY: Weekday = Weekday::Wed;
pub const RUN_HOUR: u32 = 1;

/// The first weekly slot (Wednesday 01:00 local) strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let local_today = now.with_timezone(&tz).date_naive();
    let at = NaiveTime::from_hms_opt(RUN_HOUR, 0, 0)?;

    (0..=7)
        .map(|offset| local_today + Duration::days(offset))
        .filter(|day| day.weekday() == RUN_WEEKDAY)
        .filter_map(|day| dates::to_timezone_datetime(day, at, tz))
        .map(|slot| slot.with_timezone(&Utc))
        .find(|slot| *slot > now)
}

/// Runs the pipeline at every weekly slot until the process is stopped.
/// A failed run is logged and the loop waits for the next slot.
pub async fn run_weekly(pipeline: &Pipeline, tz: Tz) {
    loop {
        let now = Utc::now();
        let Some(next) = next_run_after(now, tz) else {
            error!("could not compute the next scheduled run");
            return;
        };
        info!(next = %next.with_timezone(&tz), "waiting for next scheduled run");
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        match pipeline.run().await {
            Ok(report) => info!(
                total = report.events.len(),
                added = report.added,
                "scheduled run finished"
            ),
            Err(err) => error!(error = %err, "scheduled run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TZ: Tz = chrono_tz::America::New_York;

    #[test]
    fn picks_the_coming_wednesday() {
        // Monday 2030-04-08 12:00 local
        let now = TZ.with_ymd_and_hms(2030, 4, 8, 12, 0, 0).unwrap().with_timezone(&Utc);
        let next = next_run_after(now, TZ).unwrap().with_timezone(&TZ);
        assert_eq!(next, TZ.with_ymd_and_hms(2030, 4, 10, 1, 0, 0).unwrap());
    }

    #[test]
    fn later_on_wednesday_rolls_to_next_week() {
        let now = TZ.with_ymd_and_hms(2030, 4, 10, 1, 0, 0).unwrap().with_timezone(&Utc);
        let next = next_run_after(now, TZ).unwrap().with_timezone(&TZ);
        assert_eq!(next, TZ.with_ymd_and_hms(2030, 4, 17, 1, 0, 0).unwrap());
    }

    #[test]
    fn early_wednesday_runs_the_same_day() {
        let now = TZ.with_ymd_and_hms(2030, 4, 10, 0, 30, 0).unwrap().with_timezone(&Utc);
        let next = next_run_after(now, TZ).unwrap().with_timezone(&TZ);
        assert_eq!(next, TZ.with_ymd_and_hms(2030, 4, 10, 1, 0, 0).unwrap());
    }
}
