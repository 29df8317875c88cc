use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};

use futures::StreamExt;
use usage_model::{Channel, FixedPoint, Flow, UsageRow};

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    reconcile::bucket::rfc3339,
};

pub const HEADER: [&str; 21] = [
    "ts",
    "register_import_cumulative_kwh",
    "register_export_cumulative_kwh",
    "register_import_kwh",
    "register_export_kwh",
    "interval_import_kwh",
    "interval_export_kwh",
    "epoch_import_kwh",
    "epoch_export_kwh",
    "epoch_gas_kwh",
    "epoch_import_metered_cost",
    "epoch_export_metered_cost",
    "epoch_gas_metered_cost",
    "import_rate",
    "export_rate",
    "register_import_cost",
    "register_export_cost",
    "interval_import_cost",
    "interval_export_cost",
    "epoch_import_cost",
    "epoch_export_cost",
];

/// Writes reconciled rows as one CSV file, header first.
///
/// Rows are buffered and the file is written once the stream ends, so a
/// failed run never leaves a partial file behind.
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn kwh(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.4}")).unwrap_or_default()
}

fn rate(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.4}")).unwrap_or_default()
}

fn money(v: Option<FixedPoint>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_default()
}

/// The cells of one output line, in [`HEADER`] order.
pub fn row_record(row: &UsageRow) -> Vec<String> {
    let cumulative = |flow| kwh(row.register(flow).map(|r| r.cumulative_kwh));
    let epoch_kwh = |channel| {
        row.epoch(channel)
            .and_then(|e| e.energy_kwh())
            .map(|v| format!("{v:.4}"))
            .unwrap_or_default()
    };
    let metered = |channel| row.epoch(channel).map(|e| format!("{:.2}", e.cost)).unwrap_or_default();
    let costs = row.pricing.as_ref().map(|p| p.costs).unwrap_or_default();

    vec![
        rfc3339(row.ts),
        cumulative(Flow::Import),
        cumulative(Flow::Export),
        kwh(row.register_delta_kwh(Flow::Import)),
        kwh(row.register_delta_kwh(Flow::Export)),
        kwh(row.interval_kwh(Flow::Import)),
        kwh(row.interval_kwh(Flow::Export)),
        epoch_kwh(Channel::Import),
        epoch_kwh(Channel::Export),
        epoch_kwh(Channel::GasEnergy),
        metered(Channel::Import),
        metered(Channel::Export),
        metered(Channel::GasEnergy),
        rate(row.rate(Flow::Import)),
        rate(row.rate(Flow::Export)),
        money(costs.register_import),
        money(costs.register_export),
        money(costs.interval_import),
        money(costs.interval_export),
        money(costs.epoch_import),
        money(costs.epoch_export),
    ]
}

/// Time since the earliest of `received`, if any row arrived.
pub fn oldest_age<I>(received: I, now: SystemTime) -> Option<Duration>
where
    I: IntoIterator<Item = SystemTime>,
{
    let oldest = received.into_iter().min()?;
    now.duration_since(oldest).ok()
}

/// Renders `rows` as CSV bytes.
pub fn render<'a, I>(rows: I) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = &'a UsageRow>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for row in rows {
        writer.write_record(row_record(row))?;
    }
    writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

#[async_trait::async_trait]
impl Sink<UsageRow> for CsvFileSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<UsageRow>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut rows: Vec<UsageRow> = Vec::new();
        let mut received: Vec<SystemTime> = Vec::new();

        while let Some(item) = input.next().await {
            match item {
                Ok(env) => {
                    received.push(env.received_at);
                    rows.push(env.payload);
                }
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for CsvFileSink");
                    continue;
                }
            }
        }

        let bytes = render(&rows).map_err(|e| PipelineError::Sink(format!("failed to encode csv: {e}")))?;
        tokio::fs::write(&self.path, bytes).await.map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "csv sink write failed");
            PipelineError::Sink(format!("failed to write {}: {e}", self.path.display()))
        })?;

        // Approximate end-to-end latency from the earliest row to now.
        if let Some(age) = oldest_age(received, SystemTime::now()) {
            metrics::histogram!("reconcile_sink_latency_seconds").record(age.as_secs_f64());
            tracing::debug!(latency_ms = age.as_millis() as u64, "rows reached csv sink");
        }
        tracing::info!(path = %self.path.display(), rows = rows.len(), "usage rows written");
        Ok(())
    }
}
