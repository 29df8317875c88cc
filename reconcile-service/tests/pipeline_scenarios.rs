use std::sync::{Arc, Mutex};

use reconcile_service::{
    pipeline::{Envelope, Feeds, Pipeline, PipelineError, Sink},
    reconcile::{Window, ZoneMode},
    sinks::CsvFileSink,
    sources::{NdjsonFileSource, VecSource},
    transform::{CumulativeRecord, EpochGroupRecord, IntervalRecord, TariffRecord},
};
use time::macros::{datetime, offset};
use usage_model::{Channel, FixedPoint, Flow, MilliUnits, RawCumulativeSample, RawEpochReading, RawIntervalSample, TariffInterval, UsageRow};

#[derive(Clone, Default)]
struct CollectingSink {
    rows: Arc<Mutex<Vec<UsageRow>>>,
}

impl CollectingSink {
    fn rows(&self) -> Vec<UsageRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Sink<UsageRow> for CollectingSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<UsageRow>, PipelineError>> + Send + Unpin + 'static,
    {
        use futures::StreamExt;
        while let Some(item) = input.next().await {
            self.rows.lock().unwrap().push(item?.payload);
        }
        Ok(())
    }
}

fn two_hours() -> Window {
    Window::new(datetime!(2024-12-09 00:00:00 UTC), datetime!(2024-12-09 02:00:00 UTC)).unwrap()
}

fn epochs() -> Vec<RawEpochReading> {
    vec![
        RawEpochReading {
            group_start: datetime!(2024-12-09 00:30:00 UTC),
            duration_seconds: 1800,
            channel: Channel::Import,
            energy_wh: 500,
            cost: MilliUnits(12_000),
        },
        RawEpochReading {
            group_start: datetime!(2024-12-09 01:00:00 UTC),
            duration_seconds: 1800,
            channel: Channel::Import,
            energy_wh: 700,
            cost: MilliUnits(16_800),
        },
    ]
}

fn cumulative() -> Vec<RawCumulativeSample> {
    [("00:10", 10.0), ("00:40", 11.0), ("01:10", 11.5), ("01:40", 12.5)]
        .into_iter()
        .map(|(hm, value_kwh)| RawCumulativeSample {
            at: time::OffsetDateTime::parse(
                &format!("2024-12-09T{hm}:00Z"),
                &time::format_description::well_known::Rfc3339,
            )
            .unwrap(),
            counter: Flow::Import,
            value_kwh,
        })
        .collect()
}

fn feeds() -> Feeds {
    Feeds {
        interval_import: Some(Box::new(VecSource::new(vec![RawIntervalSample {
            interval_start: datetime!(2024-12-09 01:00:00 UTC),
            consumption_kwh: 0.5,
        }]))),
        epochs: Some(Box::new(VecSource::new(epochs()))),
        cumulative: Some(Box::new(VecSource::new(cumulative()))),
        import_tariffs: Some(Box::new(VecSource::new(vec![TariffInterval::open(20.0)]))),
        ..Feeds::default()
    }
}

#[tokio::test]
async fn two_hour_window_reconciles_every_feed() {
    let sink = CollectingSink::default();
    let pipeline = Pipeline {
        window: two_hours(),
        zone: ZoneMode::Absolute,
        feeds: feeds(),
        sink: sink.clone(),
    };
    let stats = pipeline.run().await.unwrap();
    let rows = sink.rows();

    let ts: Vec<_> = rows.iter().map(|r| r.ts).collect();
    assert_eq!(
        ts,
        vec![
            datetime!(2024-12-09 00:30:00 UTC),
            datetime!(2024-12-09 01:00:00 UTC),
            datetime!(2024-12-09 01:30:00 UTC),
        ]
    );
    assert_eq!(stats.cumulative.accepted, 4);
    assert_eq!(stats.epochs.accepted, 2);
    assert_eq!(stats.unpriced_import_rows, 0);

    let middle = &rows[1];
    assert_eq!(middle.register_delta_kwh(Flow::Import), Some(0.5));
    assert_eq!(middle.interval_kwh(Flow::Import), Some(0.5));
    // 01:00-01:30 epoch ends in this bucket's (start, start + 30m] range.
    assert_eq!(middle.epoch(Channel::Import).unwrap().energy_wh, 700);

    let costs = middle.pricing.as_ref().unwrap().costs;
    assert_eq!(costs.register_import, Some(FixedPoint::from_raw(100_000)));
    assert_eq!(costs.interval_import, Some(FixedPoint::from_raw(100_000)));
    assert_eq!(costs.epoch_import, Some(FixedPoint::from_raw(140_000)));
    assert_eq!(costs.register_export, None);
}

#[tokio::test]
async fn source_error_aborts_before_anything_is_emitted() {
    let sink = CollectingSink::default();
    let mut feeds = feeds();
    feeds.epochs = Some(Box::new(VecSource::failing(epochs(), "connection reset")));
    let pipeline = Pipeline {
        window: two_hours(),
        zone: ZoneMode::Absolute,
        feeds,
        sink: sink.clone(),
    };

    let res = pipeline.run().await;
    assert!(matches!(res, Err(PipelineError::Source(m)) if m == "connection reset"));
    assert!(sink.rows().is_empty());
}

#[tokio::test]
async fn missing_feeds_contribute_nothing() {
    let sink = CollectingSink::default();
    let pipeline = Pipeline {
        window: two_hours(),
        zone: ZoneMode::Absolute,
        feeds: Feeds {
            cumulative: Some(Box::new(VecSource::new(cumulative()))),
            ..Feeds::default()
        },
        sink: sink.clone(),
    };
    let stats = pipeline.run().await.unwrap();
    let rows = sink.rows();

    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.intervals.is_empty() && r.epochs.is_empty()));
    assert!(rows.iter().all(|r| r.rate(Flow::Import).is_none()));
    assert_eq!(stats.unpriced_import_rows, 4);
}

#[tokio::test]
async fn wall_clock_zone_aligns_to_local_half_hours() {
    let zone = ZoneMode::Wall(offset!(+05:45));
    let window = Window::new(datetime!(2024-12-09 00:15:00 UTC), datetime!(2024-12-09 01:45:00 UTC)).unwrap();
    let samples = [datetime!(2024-12-09 00:20:00 UTC), datetime!(2024-12-09 00:50:00 UTC), datetime!(2024-12-09 01:20:00 UTC)]
        .into_iter()
        .map(|interval_start| RawIntervalSample {
            interval_start,
            consumption_kwh: 0.1,
        })
        .collect();

    let sink = CollectingSink::default();
    let pipeline = Pipeline {
        window,
        zone,
        feeds: Feeds {
            interval_export: Some(Box::new(VecSource::new(samples))),
            ..Feeds::default()
        },
        sink: sink.clone(),
    };
    pipeline.run().await.unwrap();

    let ts: Vec<_> = sink.rows().iter().map(|r| r.ts).collect();
    assert_eq!(
        ts,
        vec![datetime!(2024-12-09 06:30:00 +05:45), datetime!(2024-12-09 07:00:00 +05:45)]
    );
}

#[tokio::test]
async fn ndjson_feeds_to_csv_file() {
    let dir = std::env::temp_dir().join(format!("reconcile-scenario-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let write = |name: &str, body: &str| {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    };

    let cumulative = write(
        "cumulative.ndjson",
        concat!(
            r#"{"at":"2024-12-09T00:10:00Z","counter":"import","value":10.0}"#, "\n",
            r#"{"at":"2024-12-09T00:40:00Z","counter":"import","value":11.0}"#, "\n",
            "garbage\n",
            r#"{"at":"2024-12-09T01:40:00Z","counter":"import","value":12.5}"#, "\n",
        ),
    );
    let epochs = write(
        "epochs.ndjson",
        concat!(
            r#"{"group_start":"2024-12-09T00:30:00Z","duration_seconds":1800,"readings":[{"channel":"IMPORT","energy_amount":500,"cost_amount_milli_units":12000},{"channel":"GAS_ENERGY","energy_amount":900,"cost_amount_milli_units":6300}]}"#,
            "\n",
        ),
    );
    let interval = write(
        "interval.ndjson",
        concat!(r#"{"interval_start":"2024-12-09T00:30:00Z","consumption":0.75}"#, "\n"),
    );
    let tariffs = write(
        "tariffs.ndjson",
        concat!(r#"{"rate":20.0,"valid_from":"2024-12-09T00:00:00Z","valid_to":"2024-12-09T01:00:00Z"}"#, "\n"),
    );
    let output = dir.join("usage.csv");

    let pipeline = Pipeline {
        window: two_hours(),
        zone: ZoneMode::Absolute,
        feeds: Feeds {
            interval_import: Some(Box::new(NdjsonFileSource::<IntervalRecord>::new("interval_import", &interval))),
            epochs: Some(Box::new(NdjsonFileSource::<EpochGroupRecord>::new("epochs", &epochs))),
            cumulative: Some(Box::new(NdjsonFileSource::<CumulativeRecord>::new("cumulative", &cumulative))),
            import_tariffs: Some(Box::new(NdjsonFileSource::<TariffRecord>::new("import_tariffs", &tariffs))),
            ..Feeds::default()
        },
        sink: CsvFileSink::new(&output),
    };
    pipeline.run().await.unwrap();

    let text = std::fs::read_to_string(&output).unwrap();
    std::fs::remove_dir_all(&dir).ok();

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("ts,register_import_cumulative_kwh,"));

    let first: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(first[0], "2024-12-09T00:30:00Z");
    assert_eq!(first[1], "11.0000");
    assert_eq!(first[3], "1.0000");
    assert_eq!(first[5], "0.7500");
    assert_eq!(first[7], "0.5000");
    assert_eq!(first[9], "0.9000");
    assert_eq!(first[11], "");
    assert_eq!(first[12], "6.30");
    assert_eq!(first[13], "20.0000");
    assert_eq!(first[15], "20.00");
    assert_eq!(first[17], "15.00");
    assert_eq!(first[19], "10.00");

    let last: Vec<&str> = lines[3].split(',').collect();
    assert_eq!(last[0], "2024-12-09T01:30:00Z");
    assert_eq!(last[13], "");
    assert_eq!(last[15], "");
}
