use anyhow::Result;
use async_trait::async_trait;
use crate::data::MetricRecord;

pub use args::Args;
pub use influx::InfluxClient;
pub use prom::PrometheusClient;
pub use store::Store;

mod args;
mod influx;
mod prom;
mod store;

/// Destination for normalized records.
///
/// A write either lands or fails as a whole; there is no batching.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn write(&self, record: &MetricRecord) -> Result<()>;
}
