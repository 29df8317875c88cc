use std::{marker::PhantomData, path::PathBuf};

use async_stream::try_stream;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::{
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source},
    reconcile::record_rejection,
    transform::FeedRecord,
};

/// Reads one feed from a newline-delimited JSON file.
///
/// Each line decodes into `R` and expands into domain items. Lines that fail
/// to parse or convert are logged, counted and skipped. Failing to open or
/// read the file is a source error and ends the stream.
pub struct NdjsonFileSource<R> {
    path: PathBuf,
    feed: &'static str,
    _record: PhantomData<fn() -> R>,
}

impl<R> NdjsonFileSource<R> {
    pub fn new<P: Into<PathBuf>>(feed: &'static str, path: P) -> Self {
        Self {
            path: path.into(),
            feed,
            _record: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<R> Source<R::Item> for NdjsonFileSource<R>
where
    R: FeedRecord,
{
    async fn stream(&self) -> EnvelopeStream<R::Item> {
        let path = self.path.clone();
        let feed = self.feed;
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open {feed} file {}: {e}", path.display()))
            })?;
            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0_u64;

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::Source(format!("failed to read {feed} line: {e}"))
            })? {
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                let record: R = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(feed, line = line_no, error = %e, "skipping unparsable line");
                        metrics::counter!("reconcile_source_parse_errors_total", "feed" => feed).increment(1);
                        continue;
                    }
                };
                for item in record.into_items() {
                    match item {
                        Ok(payload) => {
                            yield Envelope::now(payload);
                        }
                        Err(e) => record_rejection(feed, &e),
                    }
                }
            }
        };

        Box::pin(s)
    }
}
