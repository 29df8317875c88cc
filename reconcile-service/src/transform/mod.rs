//! Wire records for the NDJSON feeds and their conversion into domain samples.
//!
//! Conversion is pure: a record either becomes one or more samples or is
//! turned away with a [`SampleError`]. Window checks happen later in the
//! reconcilers; here only shape and a broad timestamp sanity window apply.

use serde::{de::DeserializeOwned, Deserialize};
use time::{macros::datetime, OffsetDateTime};
use usage_model::{Channel, Flow, MilliUnits, RawCumulativeSample, RawEpochReading, RawIntervalSample, TariffInterval};

use crate::reconcile::{bucket::rfc3339, SampleError};

/// A line-delimited record that expands into zero or more domain items.
pub trait FeedRecord: DeserializeOwned + Send + 'static {
    type Item: Send + 'static;

    fn into_items(self) -> Vec<Result<Self::Item, SampleError>>;
}

/// Rejects timestamps outside [2000-01-01, 2100-01-01].
pub fn check_sane(at: OffsetDateTime) -> Result<OffsetDateTime, SampleError> {
    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if at < min_ts || at > max_ts {
        return Err(SampleError::Malformed(format!("timestamp {} out of allowed range", rfc3339(at))));
    }
    Ok(at)
}

/// `{"at": "...", "counter": "import", "value": 1234.5}`
#[derive(Debug, Clone, Deserialize)]
pub struct CumulativeRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub counter: String,
    pub value: f64,
}

impl FeedRecord for CumulativeRecord {
    type Item = RawCumulativeSample;

    fn into_items(self) -> Vec<Result<RawCumulativeSample, SampleError>> {
        vec![self.into_sample()]
    }
}

impl CumulativeRecord {
    fn into_sample(self) -> Result<RawCumulativeSample, SampleError> {
        let counter: Flow = self.counter.parse().map_err(|e| SampleError::Malformed(format!("{e}")))?;
        Ok(RawCumulativeSample {
            at: check_sane(self.at)?,
            counter,
            value_kwh: self.value,
        })
    }
}

/// `{"interval_start": "...", "consumption": 0.42}`
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub interval_start: OffsetDateTime,
    pub consumption: f64,
}

impl FeedRecord for IntervalRecord {
    type Item = RawIntervalSample;

    fn into_items(self) -> Vec<Result<RawIntervalSample, SampleError>> {
        vec![check_sane(self.interval_start).map(|interval_start| RawIntervalSample {
            interval_start,
            consumption_kwh: self.consumption,
        })]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpochChannelRecord {
    pub channel: String,
    pub energy_amount: i64,
    pub cost_amount_milli_units: i64,
}

/// One sub-metering epoch with a reading per channel.
#[derive(Debug, Clone, Deserialize)]
pub struct EpochGroupRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub group_start: OffsetDateTime,
    pub duration_seconds: i64,
    #[serde(default)]
    pub readings: Vec<EpochChannelRecord>,
}

impl FeedRecord for EpochGroupRecord {
    type Item = RawEpochReading;

    /// One reading per channel; an unknown channel only drops that reading.
    fn into_items(self) -> Vec<Result<RawEpochReading, SampleError>> {
        let group_start = match check_sane(self.group_start) {
            Ok(at) => at,
            Err(e) => return vec![Err(e)],
        };
        let duration_seconds = self.duration_seconds;
        self.readings
            .into_iter()
            .map(|r| {
                let channel: Channel = r.channel.parse().map_err(|e| SampleError::Malformed(format!("{e}")))?;
                Ok(RawEpochReading {
                    group_start,
                    duration_seconds,
                    channel,
                    energy_wh: r.energy_amount,
                    cost: MilliUnits(r.cost_amount_milli_units),
                })
            })
            .collect()
    }
}

/// `{"rate": 24.57, "valid_from": "...", "valid_to": "..."}`; bounds optional.
#[derive(Debug, Clone, Deserialize)]
pub struct TariffRecord {
    pub rate: f64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_to: Option<OffsetDateTime>,
}

impl FeedRecord for TariffRecord {
    type Item = TariffInterval;

    fn into_items(self) -> Vec<Result<TariffInterval, SampleError>> {
        if !self.rate.is_finite() {
            return vec![Err(SampleError::Malformed(format!("tariff rate {}", self.rate)))];
        }
        if let (Some(from), Some(to)) = (self.valid_from, self.valid_to) {
            if from >= to {
                return vec![Err(SampleError::Malformed(format!(
                    "tariff interval [{}, {}) is empty",
                    rfc3339(from),
                    rfc3339(to)
                )))];
            }
        }
        vec![Ok(TariffInterval {
            rate: self.rate,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
        })]
    }
}
