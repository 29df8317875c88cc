use std::{fmt, str::FromStr};

use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, UtcOffset};

use super::SampleError;

/// Width of every output bucket.
pub const BUCKET_WIDTH: Duration = Duration::minutes(30);

const BUCKET_SECONDS: i64 = BUCKET_WIDTH.whole_seconds();

/// Clock used to place half-hour boundaries.
///
/// `Absolute` truncates the Unix timestamp and reports buckets in UTC.
/// `Wall` truncates the wall clock of a fixed offset and reports buckets in
/// that offset; the two only disagree for offsets that are not a whole number
/// of half hours (e.g. `+05:45`). One mode is fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneMode {
    #[default]
    Absolute,
    Wall(UtcOffset),
}

impl FromStr for ZoneMode {
    type Err = String;

    /// Accepts `absolute`, `utc` or an offset such as `+05:45`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("absolute") {
            return Ok(ZoneMode::Absolute);
        }
        if s.eq_ignore_ascii_case("utc") || s == "Z" {
            return Ok(ZoneMode::Wall(UtcOffset::UTC));
        }

        let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
            (1_i8, rest)
        } else if let Some(rest) = s.strip_prefix('-') {
            (-1_i8, rest)
        } else {
            return Err(format!("invalid zone mode '{s}'"));
        };
        let (h, m) = rest
            .split_once(':')
            .ok_or_else(|| format!("invalid utc offset '{s}'"))?;
        let hours: i8 = h.parse().map_err(|_| format!("invalid utc offset '{s}'"))?;
        let minutes: i8 = m.parse().map_err(|_| format!("invalid utc offset '{s}'"))?;
        let offset = UtcOffset::from_hms(sign * hours, sign * minutes, 0)
            .map_err(|e| format!("invalid utc offset '{s}': {e}"))?;
        Ok(ZoneMode::Wall(offset))
    }
}

impl fmt::Display for ZoneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneMode::Absolute => f.write_str("absolute"),
            ZoneMode::Wall(offset) => {
                let sign = if offset.is_negative() { '-' } else { '+' };
                write!(
                    f,
                    "{sign}{:02}:{:02}",
                    offset.whole_hours().unsigned_abs(),
                    offset.minutes_past_hour().unsigned_abs()
                )
            }
        }
    }
}

/// Start of the half-hour bucket containing `at`.
pub fn bucket_of(at: OffsetDateTime, mode: ZoneMode) -> OffsetDateTime {
    match mode {
        ZoneMode::Absolute => {
            let utc = at.to_offset(UtcOffset::UTC);
            let into_bucket = utc.unix_timestamp().rem_euclid(BUCKET_SECONDS);
            utc - Duration::seconds(into_bucket) - Duration::nanoseconds(i64::from(utc.nanosecond()))
        }
        ZoneMode::Wall(offset) => {
            let local = at.to_offset(offset);
            let minute = if local.minute() < 30 { 0 } else { 30 };
            // Whole-minute offsets keep every truncated wall time valid.
            local
                .replace_minute(minute)
                .and_then(|t| t.replace_second(0))
                .and_then(|t| t.replace_nanosecond(0))
                .unwrap_or(local)
        }
    }
}

/// The half-open reconciliation range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl Window {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, SampleError> {
        if start >= end {
            return Err(SampleError::Malformed(format!(
                "window start {} is not before end {}",
                rfc3339(start),
                rfc3339(end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start <= at && at < self.end
    }

    /// Membership test for instants that close an interval, `(start, end]`.
    pub fn contains_end(&self, at: OffsetDateTime) -> bool {
        self.start < at && at <= self.end
    }

    pub fn buckets(&self, mode: ZoneMode) -> Buckets {
        Buckets {
            next: bucket_of(self.start, mode),
            end: self.end,
        }
    }

    pub(crate) fn out_of_range(&self, at: OffsetDateTime) -> SampleError {
        SampleError::OutOfRange {
            at: rfc3339(at),
            start: rfc3339(self.start),
            end: rfc3339(self.end),
        }
    }
}

/// Bucket starts of a [`Window`] in ascending order.
#[derive(Debug, Clone)]
pub struct Buckets {
    next: OffsetDateTime,
    end: OffsetDateTime,
}

impl Iterator for Buckets {
    type Item = OffsetDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        self.next = current + BUCKET_WIDTH;
        Some(current)
    }
}

pub(crate) fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn absolute_mode_truncates_to_half_hour() {
        assert_eq!(
            bucket_of(datetime!(2024-12-09 02:29:59.999 UTC), ZoneMode::Absolute),
            datetime!(2024-12-09 02:00:00 UTC)
        );
        assert_eq!(
            bucket_of(datetime!(2024-12-09 02:30:00 UTC), ZoneMode::Absolute),
            datetime!(2024-12-09 02:30:00 UTC)
        );
    }

    #[test]
    fn absolute_mode_handles_instants_before_epoch() {
        assert_eq!(
            bucket_of(datetime!(1969-12-31 23:45:10 UTC), ZoneMode::Absolute),
            datetime!(1969-12-31 23:30:00 UTC)
        );
    }

    #[test]
    fn absolute_mode_reports_in_utc() {
        let b = bucket_of(datetime!(2024-06-01 10:40:00 +01:00), ZoneMode::Absolute);
        assert_eq!(b, datetime!(2024-06-01 09:30:00 UTC));
        assert_eq!(b.offset(), UtcOffset::UTC);
    }

    #[test]
    fn wall_and_absolute_diverge_for_quarter_hour_offsets() {
        let at = datetime!(2024-06-01 10:20:00 +05:45);
        assert_eq!(
            bucket_of(at, ZoneMode::Wall(offset!(+05:45))),
            datetime!(2024-06-01 10:00:00 +05:45)
        );
        // 10:20 +05:45 is 04:35 UTC.
        assert_eq!(bucket_of(at, ZoneMode::Absolute), datetime!(2024-06-01 04:30:00 UTC));
    }

    #[test]
    fn wall_and_absolute_agree_for_whole_hour_offsets() {
        let at = datetime!(2024-06-01 10:40:00 +01:00);
        assert_eq!(
            bucket_of(at, ZoneMode::Wall(offset!(+01:00))),
            bucket_of(at, ZoneMode::Absolute)
        );
    }

    #[test]
    fn zone_mode_parses_and_displays() {
        assert_eq!("absolute".parse::<ZoneMode>(), Ok(ZoneMode::Absolute));
        assert_eq!("+05:45".parse::<ZoneMode>(), Ok(ZoneMode::Wall(offset!(+05:45))));
        assert_eq!("-03:30".parse::<ZoneMode>(), Ok(ZoneMode::Wall(offset!(-03:30))));
        assert_eq!(ZoneMode::Wall(offset!(-03:30)).to_string(), "-03:30");
        assert!("local".parse::<ZoneMode>().is_err());
        assert!("+26:00".parse::<ZoneMode>().is_err());
    }

    #[test]
    fn window_enumerates_buckets_from_truncated_start() {
        let w = Window::new(datetime!(2024-12-09 00:10:00 UTC), datetime!(2024-12-09 01:30:00 UTC)).unwrap();
        let buckets: Vec<_> = w.buckets(ZoneMode::Absolute).collect();
        assert_eq!(
            buckets,
            vec![
                datetime!(2024-12-09 00:00:00 UTC),
                datetime!(2024-12-09 00:30:00 UTC),
                datetime!(2024-12-09 01:00:00 UTC),
            ]
        );
    }

    #[test]
    fn window_is_half_open() {
        let w = Window::new(datetime!(2024-12-09 00:00:00 UTC), datetime!(2024-12-09 01:00:00 UTC)).unwrap();
        assert!(w.contains(datetime!(2024-12-09 00:00:00 UTC)));
        assert!(!w.contains(datetime!(2024-12-09 01:00:00 UTC)));
        assert!(!w.contains_end(datetime!(2024-12-09 00:00:00 UTC)));
        assert!(w.contains_end(datetime!(2024-12-09 01:00:00 UTC)));
    }

    #[test]
    fn window_rejects_empty_range() {
        let t = datetime!(2024-12-09 00:00:00 UTC);
        assert!(matches!(Window::new(t, t), Err(SampleError::Malformed(_))));
    }
}
