use usage_model::{Flow, RawIntervalSample};

use super::{
    bucket::{bucket_of, rfc3339, Window, ZoneMode},
    store::UsageRowStore,
    SampleError,
};

/// Places supplier interval totals into their buckets.
///
/// The feed is already bucketed upstream, so each sample is written straight
/// into the store; a repeated interval overwrites the earlier value.
#[derive(Debug, Clone, Copy)]
pub struct IntervalConsumptionReconciler {
    window: Window,
    zone: ZoneMode,
}

impl IntervalConsumptionReconciler {
    pub fn new(window: Window, zone: ZoneMode) -> Self {
        Self { window, zone }
    }

    pub fn ingest(&self, store: &mut UsageRowStore, flow: Flow, sample: RawIntervalSample) -> Result<(), SampleError> {
        if !sample.consumption_kwh.is_finite() || sample.consumption_kwh < 0.0 {
            return Err(SampleError::Malformed(format!(
                "{flow} consumption {} at {}",
                sample.consumption_kwh,
                rfc3339(sample.interval_start)
            )));
        }
        if !self.window.contains(sample.interval_start) {
            return Err(self.window.out_of_range(sample.interval_start));
        }

        let bucket = bucket_of(sample.interval_start, self.zone);
        if bucket != sample.interval_start {
            tracing::debug!(
                %flow,
                interval_start = %rfc3339(sample.interval_start),
                bucket = %rfc3339(bucket),
                "interval not aligned to bucket, truncating"
            );
        }
        store.record_interval(bucket, flow, sample.consumption_kwh);
        Ok(())
    }
}
