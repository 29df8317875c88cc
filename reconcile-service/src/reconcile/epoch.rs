use std::collections::BTreeMap;

use time::{Duration, OffsetDateTime};
use usage_model::{Channel, EpochTotals, MilliUnits, RawEpochReading};

use super::{
    bucket::{bucket_of, rfc3339, Window, ZoneMode},
    store::UsageRowStore,
    SampleError,
};

/// Running cumulative energy and cost per channel, carried between finalize calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpochAccumulator {
    last: BTreeMap<Channel, EpochTotals>,
}

impl EpochAccumulator {
    pub fn last(&self, channel: Channel) -> Option<EpochTotals> {
        self.last.get(&channel).copied()
    }
}

/// Folds variable-length sub-metering epochs into half-hour buckets.
///
/// Readings are keyed by the instant their epoch ends. An epoch belongs to the
/// bucket `(start, start + 30m]` holding that end, so a 02:00-02:15 epoch and a
/// 02:15-02:30 epoch both land in the 02:00 bucket.
#[derive(Debug, Clone)]
pub struct IntervalEpochAggregator {
    window: Window,
    zone: ZoneMode,
    by_end: BTreeMap<Channel, BTreeMap<OffsetDateTime, EpochTotals>>,
    /// Sum of every stored reading per channel; bounds every partial sum.
    totals: BTreeMap<Channel, EpochTotals>,
    accepted: usize,
}

impl IntervalEpochAggregator {
    pub fn new(window: Window, zone: ZoneMode) -> Self {
        Self {
            window,
            zone,
            by_end: BTreeMap::new(),
            totals: BTreeMap::new(),
            accepted: 0,
        }
    }

    pub fn ingest(&mut self, reading: RawEpochReading) -> Result<(), SampleError> {
        if reading.duration_seconds <= 0 {
            return Err(SampleError::Malformed(format!(
                "{} epoch at {} has duration {}s",
                reading.channel,
                rfc3339(reading.group_start),
                reading.duration_seconds
            )));
        }
        if reading.energy_wh < 0 || reading.cost.0 < 0 {
            return Err(SampleError::Malformed(format!(
                "{} epoch at {} has negative amount",
                reading.channel,
                rfc3339(reading.group_start)
            )));
        }
        let end = reading.epoch_end().ok_or_else(|| {
            SampleError::Malformed(format!("{} epoch end overflows", reading.channel))
        })?;
        if !self.window.contains_end(end) {
            return Err(self.window.out_of_range(end));
        }

        let amount = EpochTotals {
            energy_wh: reading.energy_wh,
            cost: reading.cost,
        };
        let readings = self.by_end.entry(reading.channel).or_default();
        let previous = readings.get(&end).copied();
        let current = self.totals.get(&reading.channel).copied().unwrap_or_default();
        // Both sides are non-negative and `previous` is part of `current`.
        let without_previous = match previous {
            Some(p) => EpochTotals {
                energy_wh: current.energy_wh - p.energy_wh,
                cost: MilliUnits(current.cost.0 - p.cost.0),
            },
            None => current,
        };
        let total = without_previous.checked_add(amount).ok_or_else(|| {
            SampleError::Malformed(format!(
                "{} epoch ending {} overflows the channel total",
                reading.channel,
                rfc3339(end)
            ))
        })?;

        readings.insert(end, amount);
        self.totals.insert(reading.channel, total);
        if let Some(previous) = previous {
            tracing::debug!(
                channel = %reading.channel,
                epoch_end = %rfc3339(end),
                previous_wh = previous.energy_wh,
                "duplicate epoch replaced"
            );
        }
        self.accepted += 1;
        Ok(())
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Writes per-bucket totals for every channel that reported.
    ///
    /// Each bucket sums the epochs whose end falls inside it, which equals the
    /// difference between the running totals at its edges. A bucket with no
    /// epoch stays unset; the running total simply carries on to the next one.
    pub fn finalize(&self, store: &mut UsageRowStore, mut acc: EpochAccumulator) -> EpochAccumulator {
        for (&channel, readings) in &self.by_end {
            // Every partial sum is bounded by the channel total checked at ingest.
            let mut sums: BTreeMap<OffsetDateTime, EpochTotals> = BTreeMap::new();
            for (end, amount) in readings {
                let bucket = bucket_of(*end - Duration::NANOSECOND, self.zone);
                let slot = sums.entry(bucket).or_default();
                *slot = slot.checked_add(*amount).unwrap_or(*slot);
            }

            let mut missing = 0_u64;
            for bucket in self.window.buckets(self.zone) {
                match sums.get(&bucket) {
                    Some(totals) => store.record_epoch(bucket, channel, *totals),
                    None => {
                        missing += 1;
                        tracing::debug!(%channel, bucket = %rfc3339(bucket), "no epoch data for bucket");
                    }
                }
            }
            if missing > 0 {
                tracing::info!(%channel, missing_buckets = missing, "epoch feed has gaps");
                metrics::counter!("reconcile_buckets_missing_total", "feed" => "epoch", "channel" => channel.wire_name())
                    .increment(missing);
            }

            let window_total = self.totals.get(&channel).copied().unwrap_or_default();
            let base = acc.last(channel).unwrap_or_default();
            let running = base.checked_add(window_total).unwrap_or_else(|| {
                tracing::warn!(%channel, "epoch running total overflowed, restarting from this window");
                metrics::counter!("reconcile_accumulator_resets_total", "feed" => "epoch", "channel" => channel.wire_name())
                    .increment(1);
                window_total
            });
            acc.last.insert(channel, running);
        }

        acc
    }
}
