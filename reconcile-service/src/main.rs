use anyhow::Result;
use reconcile_service::{
    config::{AppConfig, FeedsConfig},
    observability,
    pipeline::{BoxedSource, Feeds, Pipeline},
    sinks::CsvFileSink,
    sources::NdjsonFileSource,
    transform::{CumulativeRecord, EpochGroupRecord, FeedRecord, IntervalRecord, TariffRecord},
};
use std::path::Path;

fn ndjson<R: FeedRecord>(feed: &'static str, path: Option<&Path>) -> Option<BoxedSource<R::Item>> {
    path.map(|p| Box::new(NdjsonFileSource::<R>::new(feed, p)) as BoxedSource<R::Item>)
}

fn feeds(cfg: &FeedsConfig) -> Feeds {
    Feeds {
        interval_import: ndjson::<IntervalRecord>("interval_import", cfg.interval_import.as_deref()),
        interval_export: ndjson::<IntervalRecord>("interval_export", cfg.interval_export.as_deref()),
        epochs: ndjson::<EpochGroupRecord>("epochs", cfg.epochs.as_deref()),
        cumulative: ndjson::<CumulativeRecord>("cumulative", cfg.cumulative.as_deref()),
        import_tariffs: ndjson::<TariffRecord>("import_tariffs", cfg.import_tariffs.as_deref()),
        export_tariffs: ndjson::<TariffRecord>("export_tariffs", cfg.export_tariffs.as_deref()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;
    let (window, zone) = cfg.window()?;

    let pipeline = Pipeline {
        window,
        zone,
        feeds: feeds(&cfg.feeds),
        sink: CsvFileSink::new(&cfg.output.path),
    };
    let stats = pipeline.run().await?;

    tracing::info!(
        intervals_rejected = stats.intervals.rejected,
        epochs_rejected = stats.epochs.rejected,
        cumulative_rejected = stats.cumulative.rejected,
        unpriced_import_rows = stats.unpriced_import_rows,
        unpriced_export_rows = stats.unpriced_export_rows,
        "run complete"
    );

    Ok(())
}
