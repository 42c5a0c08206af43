use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2})(?::(\d{2}))?\s*([ap])\.?\s*m\b\.?").expect("valid time regex"));

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First clock time in `text`, rendered as `HH:MM AM`.
pub fn find_first_time(text: &str) -> Option<String> {
    let cleaned = clean_text(text);
    let caps = TIME_RE.captures(&cleaned)?;
    let hour = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let minute = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0);
    let period = if caps.get(3)?.as_str().eq_ignore_ascii_case("a") {
        "AM"
    } else {
        "PM"
    };
    Some(format!("{:02}:{:02} {}", hour, minute, period))
}

pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    if let Some(normalized) = find_first_time(text) {
        if let Ok(time) = NaiveTime::parse_from_str(&normalized, "%I:%M %p") {
            return Some(time);
        }
    }
    let trimmed = text.trim();
    ["%H:%M", "%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
}

/// Parses a calendar date; yearless forms roll to the next occurrence on or after `today`.
pub fn parse_naive_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let cleaned = clean_text(input);
    if cleaned.is_empty() {
        return None;
    }

    let formats = [
        ("%Y-%m-%d", true),
        ("%Y/%m/%d", true),
        ("%m/%d/%Y", true),
        ("%m/%d/%y", true),
        ("%A %m/%d/%Y", true),
        ("%B %d, %Y", true),
        ("%b %d, %Y", true),
        ("%A, %B %d, %Y", true),
        ("%a, %b %d, %Y", true),
        ("%B %d %Y", true),
        ("%B %d", false),
        ("%b %d", false),
        ("%A, %B %d", false),
        ("%a, %b %d", false),
    ];

    for (fmt, has_year) in formats.iter() {
        if *has_year {
            if let Ok(date) = NaiveDate::parse_from_str(&cleaned, fmt) {
                return Some(date);
            }
            continue;
        }
        // Yearless formats need a year to parse at all. February 29 may be
        // up to four years out.
        let fmt_with_year = format!("{} %Y", fmt);
        let next = (today.year()..=today.year() + 4)
            .filter_map(|year| {
                NaiveDate::parse_from_str(&format!("{} {}", cleaned, year), &fmt_with_year).ok()
            })
            .find(|date| *date >= today);
        if next.is_some() {
            return next;
        }
    }

    None
}

pub fn to_timezone_datetime(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Tz>> {
    let naive = NaiveDateTime::new(date, time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(dt, _) => Some(dt),
        LocalResult::None => None,
    }
}

/// Resolves a model- or page-supplied date (plus optional clock text) to an instant.
///
/// Full timestamps are taken as-is; bare calendar dates are placed in `tz` at the
/// given clock time, or at local midnight when none parses.
pub fn parse_event_date(
    date_text: &str,
    time_text: Option<&str>,
    tz: Tz,
    today: NaiveDate,
) -> Option<DateTime<Utc>> {
    let trimmed = date_text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return to_timezone_datetime(naive.date(), naive.time(), tz)
                .map(|dt| dt.with_timezone(&Utc));
        }
    }

    let date = parse_naive_date(trimmed, today)?;
    let time = time_text
        .and_then(parse_clock)
        .unwrap_or(NaiveTime::MIN);
    to_timezone_datetime(date, time, tz)
        .or_else(|| to_timezone_datetime(date, NaiveTime::from_hms_opt(12, 0, 0)?, tz))
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

pub fn local_day(instant: &DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Local midnight of `day` in `tz`, as an instant.
pub fn start_of_day(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    to_timezone_datetime(day, NaiveTime::MIN, tz)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const TZ: Tz = chrono_tz::America::New_York;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()
    }

    #[test]
    fn finds_clock_times_in_prose() {
        assert_eq!(find_first_time("Doors at 8pm, show 9"), Some("08:00 PM".to_string()));
        assert_eq!(find_first_time("9:30 p.m."), Some("09:30 PM".to_string()));
        assert_eq!(find_first_time("no time here"), None);
    }

    #[test]
    fn parses_iso_dates_with_display_time_in_zone() {
        let dt = parse_event_date("2030-06-14", Some("9:00 PM"), TZ, today()).unwrap();
        let local = dt.with_timezone(&TZ);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2030, 6, 14).unwrap());
        assert_eq!(local.hour(), 21);
    }

    #[test]
    fn bare_date_without_time_lands_on_local_midnight() {
        let dt = parse_event_date("2030-06-14", Some("late"), TZ, today()).unwrap();
        let local = dt.with_timezone(&TZ);
        assert_eq!(local.hour(), 0);
        assert_eq!(local_day(&dt, TZ), NaiveDate::from_ymd_opt(2030, 6, 14).unwrap());
    }

    #[test]
    fn yearless_dates_roll_forward() {
        let date = parse_naive_date("March 3", today()).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2031, 3, 3).unwrap());
        let date = parse_naive_date("July 4", today()).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2030, 7, 4).unwrap());
    }

    #[test]
    fn leap_day_rolls_to_the_next_leap_year() {
        let date = parse_naive_date("February 29", today()).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2032, 2, 29).unwrap());
        let in_leap_year = NaiveDate::from_ymd_opt(2032, 1, 10).unwrap();
        let date = parse_naive_date("Feb 29", in_leap_year).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2032, 2, 29).unwrap());
    }

    #[test]
    fn rfc3339_is_kept_verbatim() {
        let dt = parse_event_date("2030-06-14T23:00:00Z", None, TZ, today()).unwrap();
        assert_eq!(dt.to_rfc3339(), "2030-06-14T23:00:00+00:00");
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!(parse_event_date("sometime soon", None, TZ, today()).is_none());
        assert!(parse_event_date("   ", None, TZ, today()).is_none());
    }
}
