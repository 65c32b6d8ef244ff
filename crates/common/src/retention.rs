//! Retention parameter parsing and the preserved-bucket schedule.

use crate::bucket::{self, Timeframe, TimeBucket};
use crate::error::CommonError;
use jiff::tz::TimeZone;
use jiff::{ToSpan, Zoned};
use std::collections::HashSet;

/// How many buckets "back from now" to preserve, per timeframe. Zero disables that timeframe
/// entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionParams {
    pub years: u32,
    pub quarters: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl RetentionParams {
    fn count_for(&self, timeframe: Timeframe) -> u32 {
        match timeframe {
            Timeframe::Year => self.years,
            Timeframe::Quarter => self.quarters,
            Timeframe::Month => self.months,
            Timeframe::Week => self.weeks,
            Timeframe::Day => self.days,
            Timeframe::Hour => self.hours,
            Timeframe::Minute => self.minutes,
            Timeframe::Second => self.seconds,
        }
    }

    fn enabled_timeframes(&self) -> Vec<Timeframe> {
        bucket::ALL_TIMEFRAMES.iter().copied().filter(|tf| self.count_for(*tf) > 0).collect()
    }

    /// Parses a `preserve` token string such as `"1y 4q 12m 52w 30d 24h 60M 60s"`.
    ///
    /// Units: `y` years, `q` quarters, `m` months, `w` weeks, `d` days, `h` hours, `M` minutes
    /// (capitalized to distinguish from months), `s` seconds. Tokens are whitespace-separated;
    /// each is a non-negative integer immediately followed by exactly one unit letter. Repeating
    /// a unit or an empty string is rejected.
    pub fn parse(s: &str) -> Result<Self, CommonError> {
        let mut params = RetentionParams::default();
        let mut seen = HashSet::new();
        for token in s.split_whitespace() {
            let unit = token
                .chars()
                .last()
                .ok_or_else(|| CommonError::InvalidPreserveString(s.to_owned(), "empty token".into()))?;
            let digits = &token[..token.len() - unit.len_utf8()];
            let count: u32 = digits.parse().map_err(|_| {
                CommonError::InvalidPreserveString(s.to_owned(), format!("not a non-negative integer: {token:?}"))
            })?;
            if !seen.insert(unit) {
                return Err(CommonError::InvalidPreserveString(
                    s.to_owned(),
                    format!("unit {unit:?} specified more than once"),
                ));
            }
            match unit {
                'y' => params.years = count,
                'q' => params.quarters = count,
                'm' => params.months = count,
                'w' => params.weeks = count,
                'd' => params.days = count,
                'h' => params.hours = count,
                'M' => params.minutes = count,
                's' => params.seconds = count,
                other => {
                    return Err(CommonError::InvalidPreserveString(
                        s.to_owned(),
                        format!("unknown unit letter {other:?}"),
                    ))
                }
            }
        }
        if seen.is_empty() {
            return Err(CommonError::InvalidPreserveString(s.to_owned(), "no tokens".into()));
        }
        Ok(params)
    }
}

/// A fixed `(params, now, tz)` triple with its preserved-bucket set precomputed at construction
///. Purely functional thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    params: RetentionParams,
    now: i64,
    tz: TimeZone,
    preserved: HashSet<TimeBucket>,
}

fn shift(z: &Zoned, timeframe: Timeframe, offset: i64) -> Zoned {
    let span = match timeframe {
        Timeframe::Year => offset.years(),
        Timeframe::Quarter => (offset * 3).months(),
        Timeframe::Month => offset.months(),
        Timeframe::Week => offset.weeks(),
        Timeframe::Day => offset.days(),
        Timeframe::Hour => offset.hours(),
        Timeframe::Minute => offset.minutes(),
        Timeframe::Second => offset.seconds(),
    };
    z.checked_add(span).expect("retention offsets stay within the representable calendar range")
}

impl RetentionPolicy {
    pub fn new(params: RetentionParams, now: i64, tz: TimeZone) -> Self {
        let now_zoned = jiff::Timestamp::from_second(now)
            .expect("now is a representable unix timestamp")
            .to_zoned(tz.clone());
        let mut preserved = HashSet::new();
        for timeframe in params.enabled_timeframes() {
            let count = params.count_for(timeframe);
            for offset in 0..count {
                let shifted = shift(&now_zoned, timeframe, -(i64::from(offset)));
                preserved.insert(bucket::bucket_of(shifted.timestamp().as_second(), timeframe, &tz));
            }
        }
        Self { params, now, tz, preserved }
    }

    pub fn should_preserve(&self, b: &TimeBucket) -> bool {
        self.preserved.contains(b)
    }

    /// Buckets overlapping `t`, for enabled timeframes only, in fixed descending granularity
    /// order. This order drives send-parent search.
    pub fn buckets_for(&self, t: i64) -> Vec<TimeBucket> {
        let enabled = self.params.enabled_timeframes();
        bucket::buckets_overlapping(t, &enabled, &self.tz)
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn time_zone(&self) -> &TimeZone {
        &self.tz
    }

    pub fn params(&self) -> RetentionParams {
        self.params
    }
}
