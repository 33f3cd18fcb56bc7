use serde_json::Value;
use crate::data::{strip_separator, MetricRecord, StatsSample};
use crate::error::Error;

/// Map a raw stats payload onto the fixed record shape.
///
/// Any missing or mistyped field fails the whole sample; no partial
/// record is ever produced.
pub fn normalize(sample: Value) -> Result<MetricRecord, Error> {
    let sample = serde_json::from_value::<StatsSample>(sample).map_err(|e| {
        Error::MalformedSample(e.to_string())
    })?;
    Ok(MetricRecord::from(sample))
}

impl From<StatsSample> for MetricRecord {
    fn from(sample: StatsSample) -> Self {
        Self {
            name:        strip_separator(&sample.name).to_owned(),
            id:          sample.id,
            read:        sample.read,
            num_procs:   sample.num_procs,
            limit:       sample.memory_stats.limit,
            max_usage:   sample.memory_stats.max_usage,
            usage:       sample.memory_stats.usage,
            online_cpus: sample.cpu_stats.online_cpus,
            total_usage: sample.cpu_stats.cpu_usage.total_usage,
        }
    }
}
