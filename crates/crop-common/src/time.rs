//! Time selectors and named window specifications.
//!
//! Timestamps follow datacube-style partial-date semantics: a textual time
//! denotes the whole period at its precision, so `2020-02` covers February
//! and `2020-02-28` covers that entire day. Full timestamps denote a single
//! instant.

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{CommonError, CommonResult};

/// Parse a timestamp or partial date into the period it covers.
///
/// Supports:
/// - RFC 3339: "2020-01-15T10:30:00Z" (single instant)
/// - Naive datetime, assumed UTC: "2020-01-15T10:30:00" (single instant)
/// - Date: "2020-01-15" (the whole day)
/// - Year-month: "2020-01" (the whole month)
/// - Year: "2020" (the whole year)
pub fn parse_period(s: &str) -> CommonResult<TimeRange> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(TimeRange::instant(dt.with_timezone(&Utc)));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(TimeRange::instant(Utc.from_utc_datetime(&ndt)));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let next = date
            .succ_opt()
            .ok_or_else(|| CommonError::invalid_time(s))?;
        return period(midnight(date, s)?, midnight(next, s)?);
    }

    let parts: Vec<&str> = s.split('-').collect();
    let numeric = |p: &&str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    match parts.as_slice() {
        [year, month] if numeric(year) && numeric(month) && year.len() == 4 => {
            let first = ymd(year, month, s)?;
            let next = first
                .checked_add_months(Months::new(1))
                .ok_or_else(|| CommonError::invalid_time(s))?;
            period(midnight(first, s)?, midnight(next, s)?)
        }
        [year] if numeric(year) && year.len() == 4 => {
            let first = ymd(year, "1", s)?;
            let next = first
                .checked_add_months(Months::new(12))
                .ok_or_else(|| CommonError::invalid_time(s))?;
            period(midnight(first, s)?, midnight(next, s)?)
        }
        _ => Err(CommonError::invalid_time(s)),
    }
}

/// Parse a timestamp or partial date to the first instant it covers.
pub fn parse_instant(s: &str) -> CommonResult<DateTime<Utc>> {
    Ok(parse_period(s)?.start)
}

fn ymd(year: &str, month: &str, raw: &str) -> CommonResult<NaiveDate> {
    let y: i32 = year.parse().map_err(|_| CommonError::invalid_time(raw))?;
    let m: u32 = month.parse().map_err(|_| CommonError::invalid_time(raw))?;
    NaiveDate::from_ymd_opt(y, m, 1).ok_or_else(|| CommonError::invalid_time(raw))
}

fn midnight(date: NaiveDate, raw: &str) -> CommonResult<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .ok_or_else(|| CommonError::invalid_time(raw))
}

fn period(start: DateTime<Utc>, next: DateTime<Utc>) -> CommonResult<TimeRange> {
    TimeRange::new_half_open(start, next)
}

/// A time interval, closed on both ends unless `half_open` is set, in which
/// case `end` itself is excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub half_open: bool,
}

impl TimeRange {
    /// Closed interval `[start, end]`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CommonResult<Self> {
        if start > end {
            return Err(CommonError::InvertedInterval {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self {
            start,
            end,
            half_open: false,
        })
    }

    /// Half-open interval `[start, end)`.
    pub fn new_half_open(start: DateTime<Utc>, end: DateTime<Utc>) -> CommonResult<Self> {
        let mut range = Self::new(start, end)?;
        range.half_open = true;
        Ok(range)
    }

    /// A zero-length closed interval holding one instant.
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self {
            start: at,
            end: at,
            half_open: false,
        }
    }

    /// Parse "start/end" or a single (partial) timestamp.
    ///
    /// Each side keeps its partial-date meaning: "2020-01-01/2020-02-28"
    /// runs from the start of Jan 1 through the end of Feb 28.
    pub fn parse(s: &str) -> CommonResult<Self> {
        match s.split_once('/') {
            Some((start, end)) => Self::between(start, end),
            None => parse_period(s),
        }
    }

    /// Interval from the start of `start`'s period to the end of `end`'s.
    pub fn between(start: &str, end: &str) -> CommonResult<Self> {
        let first = parse_period(start)?;
        let last = parse_period(end)?;
        if last.half_open {
            Self::new_half_open(first.start, last.end)
        } else {
            Self::new(first.start, last.end)
        }
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        if self.half_open {
            dt >= &self.start && dt < &self.end
        } else {
            dt >= &self.start && dt <= &self.end
        }
    }

    /// Smallest interval covering both `self` and `other`.
    pub fn hull(&self, other: &TimeRange) -> TimeRange {
        let start = self.start.min(other.start);
        let (end, half_open) = match self.end.cmp(&other.end) {
            Ordering::Greater => (self.end, self.half_open),
            Ordering::Less => (other.end, other.half_open),
            Ordering::Equal => (self.end, self.half_open && other.half_open),
        };
        TimeRange {
            start,
            end,
            half_open,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.half_open { ')' } else { ']' };
        write!(
            f,
            "[{}, {}{}",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            close
        )
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRange {
    Text(String),
    Pair(String, String),
    Table {
        start: String,
        end: String,
        #[serde(default)]
        half_open: bool,
    },
}

impl TryFrom<RawRange> for TimeRange {
    type Error = CommonError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        match raw {
            RawRange::Text(s) => TimeRange::parse(&s),
            RawRange::Pair(start, end) => TimeRange::between(&start, &end),
            RawRange::Table {
                start,
                end,
                half_open: false,
            } => TimeRange::between(&start, &end),
            RawRange::Table {
                start,
                end,
                half_open: true,
            } => TimeRange::new_half_open(parse_instant(&start)?, parse_instant(&end)?),
        }
    }
}

/// How one window picks time steps out of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSelector")]
pub enum TimeSelector {
    /// The single observation nearest to `at`. `period` is the span the
    /// selector was written as (a whole day for "2020-01-01") and bounds
    /// what has to be loaded for it.
    Instant { at: DateTime<Utc>, period: TimeRange },
    /// Every observation inside the interval.
    Interval(TimeRange),
}

impl TimeSelector {
    /// Nearest-match selector for an exact instant.
    pub fn nearest(at: DateTime<Utc>) -> Self {
        Self::Instant {
            at,
            period: TimeRange::instant(at),
        }
    }

    pub fn interval(range: TimeRange) -> Self {
        Self::Interval(range)
    }

    /// Parse "start/end" as an interval, anything else as an instant.
    pub fn parse(s: &str) -> CommonResult<Self> {
        if s.contains('/') {
            return Ok(Self::Interval(TimeRange::parse(s)?));
        }
        let period = parse_period(s)?;
        Ok(Self::Instant {
            at: period.start,
            period,
        })
    }

    /// The time span that must be loaded to resolve this selector.
    pub fn bounds(&self) -> TimeRange {
        match self {
            Self::Instant { period, .. } => *period,
            Self::Interval(range) => *range,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSelector {
    Text(String),
    Pair(String, String),
    Table {
        start: String,
        end: String,
        #[serde(default)]
        half_open: bool,
    },
}

impl TryFrom<RawSelector> for TimeSelector {
    type Error = CommonError;

    fn try_from(raw: RawSelector) -> Result<Self, Self::Error> {
        match raw {
            RawSelector::Text(s) => TimeSelector::parse(&s),
            RawSelector::Pair(start, end) => {
                TimeRange::try_from(RawRange::Pair(start, end)).map(TimeSelector::Interval)
            }
            RawSelector::Table {
                start,
                end,
                half_open,
            } => TimeRange::try_from(RawRange::Table {
                start,
                end,
                half_open,
            })
            .map(TimeSelector::Interval),
        }
    }
}

/// Ordered mapping of window label to time selector. Labels are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSpec {
    windows: Vec<(String, TimeSelector)>,
}

impl WindowSpec {
    pub fn new<I, S>(entries: I) -> CommonResult<Self>
    where
        I: IntoIterator<Item = (S, TimeSelector)>,
        S: Into<String>,
    {
        let mut spec = Self::default();
        for (label, selector) in entries {
            spec.push(label, selector)?;
        }
        Ok(spec)
    }

    /// Append a window, rejecting empty or already used labels.
    pub fn push(&mut self, label: impl Into<String>, selector: TimeSelector) -> CommonResult<()> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(CommonError::invalid_time("window label must not be empty"));
        }
        if self.windows.iter().any(|(existing, _)| *existing == label) {
            return Err(CommonError::DuplicateWindowLabel(label));
        }
        self.windows.push((label, selector));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TimeSelector)> {
        self.windows.iter().map(|(label, sel)| (label.as_str(), sel))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.windows.iter().map(|(label, _)| label.as_str())
    }

    pub fn get(&self, label: &str) -> Option<&TimeSelector> {
        self.windows
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, sel)| sel)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// One interval covering every window, from the earliest start to the
    /// latest end. `None` for an empty spec.
    pub fn span(&self) -> Option<TimeRange> {
        self.windows
            .iter()
            .map(|(_, sel)| sel.bounds())
            .reduce(|acc, next| acc.hull(&next))
    }
}

impl Serialize for WindowSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.windows.len()))?;
        for (label, selector) in &self.windows {
            map.serialize_entry(label, selector)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WindowSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WindowSpecVisitor;

        impl<'de> Visitor<'de> for WindowSpecVisitor {
            type Value = WindowSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of window label to time selector")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<WindowSpec, A::Error> {
                let mut spec = WindowSpec::default();
                while let Some((label, selector)) = access.next_entry::<String, TimeSelector>()? {
                    spec.push(label, selector).map_err(de::Error::custom)?;
                }
                Ok(spec)
            }
        }

        deserializer.deserialize_map(WindowSpecVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_full_timestamp() {
        let range = parse_period("2020-01-15T10:30:00Z").unwrap();
        assert_eq!(range.start, range.end);
        assert!(!range.half_open);
        assert_eq!(range.start.hour(), 10);
        assert_eq!(range.start.minute(), 30);
    }

    #[test]
    fn test_parse_partial_dates() {
        let day = parse_period("2020-02-28").unwrap();
        assert_eq!(day.start, utc(2020, 2, 28));
        assert_eq!(day.end, utc(2020, 2, 29));
        assert!(day.half_open);

        let month = parse_period("2020-02").unwrap();
        assert_eq!(month.start, utc(2020, 2, 1));
        assert_eq!(month.end, utc(2020, 3, 1));

        let year = parse_period("2021").unwrap();
        assert_eq!(year.start, utc(2021, 1, 1));
        assert_eq!(year.end, utc(2022, 1, 1));

        assert!(parse_period("2020-13").is_err());
        assert!(parse_period("yesterday").is_err());
    }

    #[test]
    fn test_interval_covers_whole_end_day() {
        let range = TimeRange::parse("2020-01-01/2020-02-28").unwrap();
        let late_on_last_day = Utc.with_ymd_and_hms(2020, 2, 28, 23, 59, 59).unwrap();

        assert!(range.contains(&utc(2020, 1, 1)));
        assert!(range.contains(&late_on_last_day));
        assert!(!range.contains(&utc(2020, 2, 29)));
    }

    #[test]
    fn test_inverted_interval_rejected() {
        assert!(matches!(
            TimeRange::parse("2020-03-01/2020-01-01"),
            Err(CommonError::InvertedInterval { .. })
        ));
    }

    #[test]
    fn test_selector_parse() {
        match TimeSelector::parse("2020-01-01").unwrap() {
            TimeSelector::Instant { at, period } => {
                assert_eq!(at, utc(2020, 1, 1));
                assert_eq!(period.end, utc(2020, 1, 2));
            }
            other => panic!("Expected instant, got {:?}", other),
        }

        assert!(matches!(
            TimeSelector::parse("2020-01/2020-06").unwrap(),
            TimeSelector::Interval(_)
        ));
    }

    #[test]
    fn test_window_spec_preserves_order_from_yaml() {
        let yaml = r#"
s2: "2020-07-01/2020-12-31"
s1: "2020-01-01/2020-06-30"
mid: "2020-06-15"
"#;
        let spec: WindowSpec = serde_yaml::from_str(yaml).unwrap();
        let labels: Vec<&str> = spec.labels().collect();
        assert_eq!(labels, vec!["s2", "s1", "mid"]);

        let span = spec.span().unwrap();
        assert_eq!(span.start, utc(2020, 1, 1));
        assert_eq!(span.end, utc(2021, 1, 1));
        assert!(span.half_open);
        assert_eq!(span.end.year(), 2021);
    }

    #[test]
    fn test_window_spec_selector_forms() {
        let yaml = r#"
pair: ["2020-01-01", "2020-02-28"]
table: { start: "2020-03-01", end: "2020-05-01", half_open: true }
"#;
        let spec: WindowSpec = serde_yaml::from_str(yaml).unwrap();

        let pair = spec.get("pair").unwrap().bounds();
        assert!(pair.contains(&utc(2020, 2, 28)));

        let table = spec.get("table").unwrap().bounds();
        assert!(table.contains(&utc(2020, 4, 30)));
        assert!(!table.contains(&utc(2020, 5, 1)));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let mut spec = WindowSpec::default();
        spec.push("b1", TimeSelector::nearest(utc(2020, 1, 1))).unwrap();
        let err = spec
            .push("b1", TimeSelector::nearest(utc(2020, 2, 1)))
            .unwrap_err();
        assert!(matches!(err, CommonError::DuplicateWindowLabel(label) if label == "b1"));
        assert!(spec.push(" ", TimeSelector::nearest(utc(2020, 2, 1))).is_err());
    }

    #[test]
    fn test_empty_spec_has_no_span() {
        assert!(WindowSpec::default().span().is_none());
    }
}
