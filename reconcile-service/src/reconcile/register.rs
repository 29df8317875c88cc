use std::collections::BTreeMap;

use time::OffsetDateTime;
use usage_model::{Flow, RawCumulativeSample, RegisterReading};

use super::{
    bucket::{bucket_of, rfc3339, Window, ZoneMode},
    store::UsageRowStore,
    SampleError,
};

/// Last known counter value per flow, carried between finalize calls.
///
/// Start every independent run from [`RegisterAccumulator::default`]; feed the
/// returned accumulator into the next window to chain runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterAccumulator {
    last: BTreeMap<Flow, f64>,
}

impl RegisterAccumulator {
    pub fn last(&self, flow: Flow) -> Option<f64> {
        self.last.get(&flow).copied()
    }
}

/// Turns cumulative counter samples into per-bucket deltas.
///
/// Each bucket keeps the highest value seen for each counter, so delivery order
/// and duplicates across pages do not matter.
#[derive(Debug, Clone)]
pub struct CumulativeRegisterReconciler {
    window: Window,
    zone: ZoneMode,
    maxima: BTreeMap<Flow, BTreeMap<OffsetDateTime, f64>>,
    accepted: usize,
}

impl CumulativeRegisterReconciler {
    pub fn new(window: Window, zone: ZoneMode) -> Self {
        Self {
            window,
            zone,
            maxima: BTreeMap::new(),
            accepted: 0,
        }
    }

    pub fn ingest(&mut self, sample: RawCumulativeSample) -> Result<(), SampleError> {
        if !sample.value_kwh.is_finite() || sample.value_kwh < 0.0 {
            return Err(SampleError::Malformed(format!(
                "{} counter value {} at {}",
                sample.counter,
                sample.value_kwh,
                rfc3339(sample.at)
            )));
        }
        if !self.window.contains(sample.at) {
            return Err(self.window.out_of_range(sample.at));
        }

        let bucket = bucket_of(sample.at, self.zone);
        let value = sample.value_kwh;
        self.maxima
            .entry(sample.counter)
            .or_default()
            .entry(bucket)
            .and_modify(|max| *max = max.max(value))
            .or_insert(value);
        self.accepted += 1;
        Ok(())
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn bucket_max(&self, flow: Flow, bucket: OffsetDateTime) -> Option<f64> {
        self.maxima.get(&flow).and_then(|m| m.get(&bucket)).copied()
    }

    /// Writes a [`RegisterReading`] for every bucket from the first known value onwards.
    ///
    /// A bucket with a maximum gets `delta = max - previous known max`. A bucket
    /// without one repeats the previous value with no delta. A maximum below the
    /// previous value is taken as a counter reset and gets no delta either.
    pub fn finalize(&self, store: &mut UsageRowStore, mut acc: RegisterAccumulator) -> RegisterAccumulator {
        let empty = BTreeMap::new();

        for flow in Flow::ALL {
            let maxima = self.maxima.get(&flow).unwrap_or(&empty);
            let mut last = acc.last(flow);

            for bucket in self.window.buckets(self.zone) {
                match maxima.get(&bucket) {
                    Some(&max) => {
                        let delta_kwh = match last {
                            Some(prev) if max >= prev => Some(max - prev),
                            Some(prev) => {
                                tracing::warn!(
                                    counter = %flow,
                                    bucket = %rfc3339(bucket),
                                    previous = prev,
                                    current = max,
                                    "cumulative counter went backwards, treating as reset"
                                );
                                None
                            }
                            None => None,
                        };
                        store.record_register(
                            bucket,
                            flow,
                            RegisterReading {
                                cumulative_kwh: max,
                                delta_kwh,
                                carried_forward: false,
                            },
                        );
                        last = Some(max);
                    }
                    None => {
                        if let Some(prev) = last {
                            store.record_register(
                                bucket,
                                flow,
                                RegisterReading {
                                    cumulative_kwh: prev,
                                    delta_kwh: None,
                                    carried_forward: true,
                                },
                            );
                        }
                    }
                }
            }

            if let Some(v) = last {
                acc.last.insert(flow, v);
            }
        }

        acc
    }
}
