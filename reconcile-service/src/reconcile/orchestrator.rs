use usage_model::{
    Channel, Flow, RawCumulativeSample, RawEpochReading, RawIntervalSample, RowCosts, RowPricing, TariffInterval,
    UsageRow,
};

use super::{
    bucket::{Window, ZoneMode},
    cost::{cost, cost_fixed},
    epoch::{EpochAccumulator, IntervalEpochAggregator},
    interval::IntervalConsumptionReconciler,
    record_rejection,
    register::{CumulativeRegisterReconciler, RegisterAccumulator},
    store::UsageRowStore,
    tariff, SampleError,
};

/// Accepted / rejected record counts for one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub accepted: usize,
    pub rejected: usize,
}

impl FeedStats {
    fn track(&mut self, feed: &'static str, res: Result<(), SampleError>) {
        match res {
            Ok(()) => self.accepted += 1,
            Err(e) => {
                self.rejected += 1;
                record_rejection(feed, &e);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub intervals: FeedStats,
    pub epochs: FeedStats,
    pub cumulative: FeedStats,
    pub import_tariffs: usize,
    pub export_tariffs: usize,
    pub unpriced_import_rows: usize,
    pub unpriced_export_rows: usize,
}

/// Everything a finished run hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    /// Ascending by bucket, first bucket dropped.
    pub rows: Vec<UsageRow>,
    pub registers: RegisterAccumulator,
    pub epochs: EpochAccumulator,
    pub stats: RunStats,
}

/// Already-fetched inputs for [`Orchestrator::reconcile`].
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub interval_import: Vec<RawIntervalSample>,
    pub interval_export: Vec<RawIntervalSample>,
    pub epochs: Vec<RawEpochReading>,
    pub cumulative: Vec<RawCumulativeSample>,
    /// Ordered by preference; the first covering interval wins.
    pub import_tariffs: Vec<TariffInterval>,
    pub export_tariffs: Vec<TariffInterval>,
}

/// Drives one reconciliation run over a shared [`UsageRowStore`].
///
/// Sources are fed in phase order: interval consumption, epochs, cumulative
/// registers. [`Orchestrator::finish`] then finalizes the reconcilers, prices
/// every row exactly once and returns the sorted rows. Malformed or
/// out-of-window records are logged and skipped; they never abort the run.
pub struct Orchestrator {
    window: Window,
    zone: ZoneMode,
    store: UsageRowStore,
    intervals: IntervalConsumptionReconciler,
    epochs: IntervalEpochAggregator,
    registers: CumulativeRegisterReconciler,
    register_acc: RegisterAccumulator,
    epoch_acc: EpochAccumulator,
    stats: RunStats,
}

impl Orchestrator {
    pub fn new(window: Window, zone: ZoneMode) -> Self {
        Self::with_accumulators(window, zone, RegisterAccumulator::default(), EpochAccumulator::default())
    }

    /// Continues from the accumulators of a previous, adjacent window.
    pub fn with_accumulators(
        window: Window,
        zone: ZoneMode,
        register_acc: RegisterAccumulator,
        epoch_acc: EpochAccumulator,
    ) -> Self {
        Self {
            window,
            zone,
            store: UsageRowStore::new(),
            intervals: IntervalConsumptionReconciler::new(window, zone),
            epochs: IntervalEpochAggregator::new(window, zone),
            registers: CumulativeRegisterReconciler::new(window, zone),
            register_acc,
            epoch_acc,
            stats: RunStats::default(),
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn zone(&self) -> ZoneMode {
        self.zone
    }

    pub fn ingest_interval(&mut self, flow: Flow, sample: RawIntervalSample) {
        let res = self.intervals.ingest(&mut self.store, flow, sample);
        self.stats.intervals.track("interval", res);
    }

    pub fn ingest_epoch(&mut self, reading: RawEpochReading) {
        let res = self.epochs.ingest(reading);
        self.stats.epochs.track("epoch", res);
    }

    pub fn ingest_cumulative(&mut self, sample: RawCumulativeSample) {
        let res = self.registers.ingest(sample);
        self.stats.cumulative.track("cumulative", res);
    }

    /// Finalizes every source, then resolves tariffs and costs.
    pub fn finish(mut self, import_tariffs: &[TariffInterval], export_tariffs: &[TariffInterval]) -> RunOutput {
        tracing::info!(
            accepted = self.stats.intervals.accepted,
            rejected = self.stats.intervals.rejected,
            "interval consumption reconciled"
        );

        let epoch_acc = self.epochs.finalize(&mut self.store, self.epoch_acc);
        tracing::info!(
            accepted = self.stats.epochs.accepted,
            rejected = self.stats.epochs.rejected,
            "epoch readings reconciled"
        );

        let register_acc = self.registers.finalize(&mut self.store, self.register_acc);
        tracing::info!(
            accepted = self.stats.cumulative.accepted,
            rejected = self.stats.cumulative.rejected,
            "cumulative registers reconciled"
        );

        let mut stats = self.stats;
        stats.import_tariffs = import_tariffs.len();
        stats.export_tariffs = export_tariffs.len();

        let already_priced = self.store.price_rows(|row| {
            let pricing = price_row(row, import_tariffs, export_tariffs);
            if pricing.import_rate.is_none() {
                stats.unpriced_import_rows += 1;
            }
            if pricing.export_rate.is_none() {
                stats.unpriced_export_rows += 1;
            }
            pricing
        });
        debug_assert_eq!(already_priced, 0);

        for (flow, unpriced) in [
            (Flow::Import, stats.unpriced_import_rows),
            (Flow::Export, stats.unpriced_export_rows),
        ] {
            if unpriced > 0 {
                tracing::warn!(%flow, rows = unpriced, "no tariff interval matched, costs left undefined");
                metrics::counter!("reconcile_tariff_unresolved_total", "flow" => flow.as_str()).increment(unpriced as u64);
            }
        }

        // The earliest bucket has no predecessor to diff against.
        let rows: Vec<UsageRow> = self.store.into_rows().into_iter().skip(1).collect();
        tracing::info!(rows = rows.len(), "reconciliation finished");

        RunOutput {
            rows,
            registers: register_acc,
            epochs: epoch_acc,
            stats,
        }
    }

    /// Runs every phase over already-fetched inputs.
    pub fn reconcile(window: Window, zone: ZoneMode, inputs: RunInputs) -> RunOutput {
        let mut run = Self::new(window, zone);
        for sample in inputs.interval_import {
            run.ingest_interval(Flow::Import, sample);
        }
        for sample in inputs.interval_export {
            run.ingest_interval(Flow::Export, sample);
        }
        for reading in inputs.epochs {
            run.ingest_epoch(reading);
        }
        for sample in inputs.cumulative {
            run.ingest_cumulative(sample);
        }
        run.finish(&inputs.import_tariffs, &inputs.export_tariffs)
    }
}

fn price_row(row: &UsageRow, import_tariffs: &[TariffInterval], export_tariffs: &[TariffInterval]) -> RowPricing {
    let import_rate = tariff::resolve(row.ts, import_tariffs);
    let export_rate = tariff::resolve(row.ts, export_tariffs);
    let rate_for = |flow: Flow| match flow {
        Flow::Import => import_rate,
        Flow::Export => export_rate,
    };
    let epoch_cost = |channel: Channel| {
        let totals = row.epoch(channel)?;
        cost_fixed(totals.energy_kwh()?, channel.priced_flow().and_then(rate_for))
    };

    RowPricing {
        import_rate,
        export_rate,
        costs: RowCosts {
            register_import: cost(row.register_delta_kwh(Flow::Import), import_rate),
            register_export: cost(row.register_delta_kwh(Flow::Export), export_rate),
            interval_import: cost(row.interval_kwh(Flow::Import), import_rate),
            interval_export: cost(row.interval_kwh(Flow::Export), export_rate),
            epoch_import: epoch_cost(Channel::Import),
            epoch_export: epoch_cost(Channel::Export),
        },
    }
}
