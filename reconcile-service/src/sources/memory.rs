use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// Replays a fixed list of items, optionally ending in a failure.
///
/// Used to drive the pipeline from already-fetched data.
#[derive(Debug, Clone)]
pub struct VecSource<T> {
    items: Vec<T>,
    fail_with: Option<String>,
}

impl<T> VecSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, fail_with: None }
    }

    /// Yields every item, then a [`PipelineError::Source`] with `message`.
    pub fn failing(items: Vec<T>, message: impl Into<String>) -> Self {
        Self {
            items,
            fail_with: Some(message.into()),
        }
    }
}

#[async_trait::async_trait]
impl<T> Source<T> for VecSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn stream(&self) -> EnvelopeStream<T> {
        let items = self.items.clone().into_iter().map(|t| Ok(Envelope::now(t)));
        let tail = self.fail_with.clone().map(|m| Err(PipelineError::Source(m)));
        Box::pin(futures::stream::iter(items.chain(tail)))
    }
}
