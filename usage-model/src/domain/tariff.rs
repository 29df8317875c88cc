use time::OffsetDateTime;

/// A unit rate valid over the half-open range `[valid_from, valid_to)`.
///
/// An unset `valid_from` reaches back to the beginning of time, an unset
/// `valid_to` never expires.
#[derive(Debug, Clone, PartialEq)]
pub struct TariffInterval {
    pub rate: f64,
    pub valid_from: Option<OffsetDateTime>,
    pub valid_to: Option<OffsetDateTime>,
}

impl TariffInterval {
    pub fn open(rate: f64) -> Self {
        Self {
            rate,
            valid_from: None,
            valid_to: None,
        }
    }

    pub fn between(rate: f64, valid_from: OffsetDateTime, valid_to: OffsetDateTime) -> Self {
        Self {
            rate,
            valid_from: Some(valid_from),
            valid_to: Some(valid_to),
        }
    }
}
