pub mod config;
pub mod observability;
pub mod pipeline;
pub mod reconcile;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{Envelope, Feeds, Pipeline};
