//! Grid-aligned time bucket algebra.
//!
//! A [`TimeBucket`] is a half-open `[start, end)` interval on the unix timeline, aligned to a
//! named [`Timeframe`] in a fixed time zone. All truncation and shifting is performed through
//! `jiff`'s zone-aware civil arithmetic so that daylight-saving transitions never shift the
//! grid: buckets remain contiguous and non-overlapping on the absolute timeline even though the
//! wall-clock reading that labels them may skip or repeat.

use jiff::civil::{Date, Weekday};
use jiff::tz::TimeZone;
use jiff::{ToSpan, Zoned};
use std::fmt;

/// The eight supported granularities, ordered coarsest-first. This order is load-bearing: it is
/// the order backup send-parents are searched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

/// All timeframes, coarsest-first. This is the canonical descending-granularity order used
/// throughout retention scheduling and the resolver.
pub const ALL_TIMEFRAMES: [Timeframe; 8] = [
    Timeframe::Year,
    Timeframe::Quarter,
    Timeframe::Month,
    Timeframe::Week,
    Timeframe::Day,
    Timeframe::Hour,
    Timeframe::Minute,
    Timeframe::Second,
];

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::Year => "year",
            Timeframe::Quarter => "quarter",
            Timeframe::Month => "month",
            Timeframe::Week => "week",
            Timeframe::Day => "day",
            Timeframe::Hour => "hour",
            Timeframe::Minute => "minute",
            Timeframe::Second => "second",
        };
        f.write_str(s)
    }
}

/// A half-open `[start, end)` interval of unix seconds, aligned to a [`Timeframe`].
///
/// Equality and ordering are structural on the interval endpoints only, ("Equality
/// is structural on the interval"): two buckets of different timeframes that happen to cover the
/// same span (which cannot happen for the grids this module defines, but isn't ruled out in
/// principle) compare equal.
#[derive(Debug, Clone, Copy)]
pub struct TimeBucket {
    pub start: i64,
    pub end: i64,
    pub timeframe: Timeframe,
}

impl PartialEq for TimeBucket {
    fn eq(&self, other: &Self) -> bool {
        (self.start, self.end) == (other.start, other.end)
    }
}
impl Eq for TimeBucket {}

impl std::hash::Hash for TimeBucket {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl PartialOrd for TimeBucket {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimeBucket {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.start, self.end).cmp(&(other.start, other.end))
    }
}

fn zoned_at(date: Date, hour: i8, minute: i8, second: i8, tz: &TimeZone) -> Zoned {
    date.at(hour, minute, second, 0)
        .to_zoned(tz.clone())
        .expect("grid boundary civil datetimes are always representable")
}

fn start_of_year(z: &Zoned) -> Zoned {
    zoned_at(Date::new(z.year(), 1, 1).expect("valid date"), 0, 0, 0, z.time_zone())
}

fn quarter_start_month(month: i8) -> i8 {
    (month - 1) / 3 * 3 + 1
}

fn start_of_quarter(z: &Zoned) -> Zoned {
    zoned_at(
        Date::new(z.year(), quarter_start_month(z.month()), 1).expect("valid date"),
        0,
        0,
        0,
        z.time_zone(),
    )
}

fn start_of_month(z: &Zoned) -> Zoned {
    zoned_at(Date::new(z.year(), z.month(), 1).expect("valid date"), 0, 0, 0, z.time_zone())
}

/// Days since the most recent (or current) Monday, per ISO 8601 (Mon=1..Sun=7).
fn days_since_iso_monday(weekday: Weekday) -> i64 {
    i64::from(weekday.to_monday_one_offset()) - 1
}

fn start_of_week(z: &Zoned) -> Zoned {
    let offset = days_since_iso_monday(z.weekday());
    let monday = z
        .date()
        .checked_sub(offset.days())
        .expect("iso week start stays in range for realistic timestamps");
    zoned_at(monday, 0, 0, 0, z.time_zone())
}

fn start_of_day(z: &Zoned) -> Zoned {
    zoned_at(z.date(), 0, 0, 0, z.time_zone())
}

fn start_of_hour(z: &Zoned) -> Zoned {
    zoned_at(z.date(), z.hour(), 0, 0, z.time_zone())
}

fn start_of_minute(z: &Zoned) -> Zoned {
    zoned_at(z.date(), z.hour(), z.minute(), 0, z.time_zone())
}

fn start_of_second(z: &Zoned) -> Zoned {
    zoned_at(z.date(), z.hour(), z.minute(), z.second(), z.time_zone())
}

fn end_of(start: &Zoned, timeframe: Timeframe) -> Zoned {
    let span = match timeframe {
        Timeframe::Year => 1.year(),
        Timeframe::Quarter => 3.months(),
        Timeframe::Month => 1.month(),
        Timeframe::Week => 1.week(),
        Timeframe::Day => 1.day(),
        Timeframe::Hour => 1.hour(),
        Timeframe::Minute => 1.minute(),
        Timeframe::Second => 1.second(),
    };
    start
        .checked_add(span)
        .expect("bucket end stays in representable range for realistic timestamps")
}

/// Returns the `TimeBucket` of the given `timeframe` that contains `t` (unix seconds), in `tz`.
pub fn bucket_of(t: i64, timeframe: Timeframe, tz: &TimeZone) -> TimeBucket {
    let z = jiff::Timestamp::from_second(t)
        .expect("unix seconds in representable range")
        .to_zoned(tz.clone());
    let start = match timeframe {
        Timeframe::Year => start_of_year(&z),
        Timeframe::Quarter => start_of_quarter(&z),
        Timeframe::Month => start_of_month(&z),
        Timeframe::Week => start_of_week(&z),
        Timeframe::Day => start_of_day(&z),
        Timeframe::Hour => start_of_hour(&z),
        Timeframe::Minute => start_of_minute(&z),
        Timeframe::Second => start_of_second(&z),
    };
    let end = end_of(&start, timeframe);
    TimeBucket { start: start.timestamp().as_second(), end: end.timestamp().as_second(), timeframe }
}

/// Yields the bucket containing `t` for each timeframe in `enabled`, in fixed descending
/// granularity order (year, quarter, month, week, day, hour, minute, second) regardless of the
/// order `enabled` is given in. This order is observable: it determines send-parent search order
/// in the resolver.
pub fn buckets_overlapping(t: i64, enabled: &[Timeframe], tz: &TimeZone) -> Vec<TimeBucket> {
    ALL_TIMEFRAMES
        .iter()
        .filter(|tf| enabled.contains(tf))
        .map(|tf| bucket_of(t, *tf, tz))
        .collect()
}

/// Renders a bucket in a short, human-friendly ISO-8601-repeating-interval-adjacent form, e.g.
/// `2006/P1Y`, `2006-Q4/P1Q`, `2006-W48/P1W`. Used only for presentation (plan printing); never
/// load-bearing for equality or scheduling.
pub fn describe(bucket: &TimeBucket, tz: &TimeZone) -> String {
    let z = jiff::Timestamp::from_second(bucket.start)
        .expect("representable timestamp")
        .to_zoned(tz.clone());
    match bucket.timeframe {
        Timeframe::Year => format!("{:04}/P1Y", z.year()),
        Timeframe::Quarter => {
            format!("{:04}-Q{}/P1Q", z.year(), (z.month() - 1) / 3 + 1)
        }
        Timeframe::Month => format!("{:04}-{:02}/P1M", z.year(), z.month()),
        Timeframe::Week => {
            let iso = z.date().iso_week_date();
            format!("{:04}-W{:02}/P1W", iso.year(), iso.week())
        }
        Timeframe::Day => format!("{:04}-{:02}-{:02}/P1D", z.year(), z.month(), z.day()),
        Timeframe::Hour => format!("{:04}-{:02}-{:02}T{:02}/PT1H", z.year(), z.month(), z.day(), z.hour()),
        Timeframe::Minute => format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}/PT1M",
            z.year(),
            z.month(),
            z.day(),
            z.hour(),
            z.minute()
        ),
        Timeframe::Second => format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}/PT1S",
            z.year(),
            z.month(),
            z.day(),
            z.hour(),
            z.minute(),
            z.second()
        ),
    }
}
