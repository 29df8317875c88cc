use time::OffsetDateTime;
use usage_model::TariffInterval;

/// Whether `at` falls inside `[valid_from, valid_to)`, treating unset bounds as open.
pub fn covers(interval: &TariffInterval, at: OffsetDateTime) -> bool {
    let started = interval.valid_from.map_or(true, |from| at >= from);
    let not_expired = interval.valid_to.map_or(true, |to| at < to);
    started && not_expired
}

/// Rate applicable at `at`.
///
/// Intervals may overlap and arrive unsorted; the first covering interval in
/// slice order wins, so callers order the slice by preference. `None` means no
/// interval matched and is never replaced by a zero rate.
pub fn resolve(at: OffsetDateTime, intervals: &[TariffInterval]) -> Option<f64> {
    intervals.iter().find(|iv| covers(iv, at)).map(|iv| iv.rate)
}
