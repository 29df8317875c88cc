use std::{pin::Pin, time::SystemTime};

use futures::{Stream, StreamExt};
use usage_model::{Flow, RawCumulativeSample, RawEpochReading, RawIntervalSample, TariffInterval, UsageRow};

use crate::reconcile::{orchestrator::RunStats, Orchestrator, Window, ZoneMode};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("sink error: {0}")]
    Sink(String),
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub type BoxedSource<T> = Box<dyn Source<T>>;

/// The sources feeding one run. A missing feed contributes nothing.
#[derive(Default)]
pub struct Feeds {
    pub interval_import: Option<BoxedSource<RawIntervalSample>>,
    pub interval_export: Option<BoxedSource<RawIntervalSample>>,
    pub epochs: Option<BoxedSource<RawEpochReading>>,
    pub cumulative: Option<BoxedSource<RawCumulativeSample>>,
    /// Yielded in preference order.
    pub import_tariffs: Option<BoxedSource<TariffInterval>>,
    pub export_tariffs: Option<BoxedSource<TariffInterval>>,
}

/// Drains every feed into an [`Orchestrator`] and hands the rows to a sink.
///
/// Feeds are drained one after another in phase order, so the row store only
/// ever has a single writer. The first source error aborts the run before
/// anything reaches the sink.
pub struct Pipeline<K> {
    pub window: Window,
    pub zone: ZoneMode,
    pub feeds: Feeds,
    pub sink: K,
}

impl<K> Pipeline<K>
where
    K: Sink<UsageRow> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<RunStats, PipelineError> {
        tracing::info!(
            start = %self.window.start(),
            end = %self.window.end(),
            zone = %self.zone,
            "starting reconciliation"
        );
        let mut run = Orchestrator::new(self.window, self.zone);
        let feeds = self.feeds;

        if let Some(source) = &feeds.interval_import {
            drain(source.as_ref(), "interval_import", |s| run.ingest_interval(Flow::Import, s)).await?;
        }
        if let Some(source) = &feeds.interval_export {
            drain(source.as_ref(), "interval_export", |s| run.ingest_interval(Flow::Export, s)).await?;
        }
        if let Some(source) = &feeds.epochs {
            drain(source.as_ref(), "epochs", |r| run.ingest_epoch(r)).await?;
        }
        if let Some(source) = &feeds.cumulative {
            drain(source.as_ref(), "cumulative", |s| run.ingest_cumulative(s)).await?;
        }

        let import_tariffs = collect(feeds.import_tariffs.as_deref(), "import_tariffs").await?;
        let export_tariffs = collect(feeds.export_tariffs.as_deref(), "export_tariffs").await?;

        let output = run.finish(&import_tariffs, &export_tariffs);
        metrics::counter!("reconcile_rows_emitted_total").increment(output.rows.len() as u64);

        let received_at = SystemTime::now();
        let rows = futures::stream::iter(
            output
                .rows
                .into_iter()
                .map(move |payload| Ok::<_, PipelineError>(Envelope { payload, received_at })),
        );
        self.sink.run(rows).await?;

        Ok(output.stats)
    }
}

async fn drain<T, F>(source: &dyn Source<T>, feed: &'static str, mut apply: F) -> Result<usize, PipelineError>
where
    F: FnMut(T),
{
    let mut stream = source.stream().await;
    let mut count = 0;
    while let Some(item) = stream.next().await {
        let env = item.map_err(|e| {
            tracing::error!(feed, error = %e, "source failed, aborting run");
            e
        })?;
        apply(env.payload);
        count += 1;
    }
    tracing::info!(feed, records = count, "source drained");
    Ok(count)
}

async fn collect<T>(source: Option<&dyn Source<T>>, feed: &'static str) -> Result<Vec<T>, PipelineError> {
    let mut items = Vec::new();
    if let Some(source) = source {
        drain(source, feed, |t| items.push(t)).await?;
    }
    Ok(items)
}
