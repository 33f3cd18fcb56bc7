use std::collections::HashMap;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::error::Error;

/// One entry of the bulk container listing.
#[derive(Clone, Debug, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id:      String,
    #[serde(rename = "Names", default)]
    pub names:   Vec<String>,
    #[serde(rename = "Image", default)]
    pub image:   String,
    #[serde(rename = "State", default)]
    pub state:   String,
    #[serde(rename = "Created", default, with = "chrono::serde::ts_seconds_option")]
    pub created: Option<DateTime<Utc>>,
}

impl ContainerSummary {
    pub fn name(&self) -> &str {
        self.names.first().map(|n| strip_separator(n)).unwrap_or("")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContainerRecord {
    pub id:         String,
    pub name:       String,
    pub image:      String,
    pub started_at: DateTime<Utc>,
    pub origin:     Origin,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Origin {
    BulkSnapshot,
    LifecycleEvent,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LifecycleEvent {
    pub id:     String,
    #[serde(default)]
    pub from:   String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time:   DateTime<Utc>,
    pub status: Status,
    #[serde(rename = "Actor", default)]
    pub actor:  Actor,
}

impl LifecycleEvent {
    pub fn name(&self) -> &str {
        self.actor.attributes.get("name").map(String::as_str).unwrap_or("")
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Actor {
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(from = "String")]
pub enum Status {
    Start,
    Stop,
    Other(String),
}

impl From<String> for Status {
    fn from(status: String) -> Self {
        match status.as_str() {
            "start" => Self::Start,
            "stop"  => Self::Stop,
            _       => Self::Other(status),
        }
    }
}

/// Audit entry appended for every start event.
#[derive(Clone, Debug, PartialEq)]
pub struct History {
    pub time: DateTime<Utc>,
    pub id:   String,
}

/// Raw stats payload as streamed by the runtime. Every field is required.
#[derive(Debug, Deserialize)]
pub struct StatsSample {
    pub id:           String,
    pub name:         String,
    pub read:         DateTime<Utc>,
    pub num_procs:    u64,
    pub cpu_stats:    CpuStats,
    pub memory_stats: MemoryStats,
}

#[derive(Debug, Deserialize)]
pub struct CpuStats {
    pub online_cpus: u64,
    pub cpu_usage:   CpuUsage,
}

#[derive(Debug, Deserialize)]
pub struct CpuUsage {
    pub total_usage: u64,
}

#[derive(Debug, Deserialize)]
pub struct MemoryStats {
    pub limit:     u64,
    pub max_usage: u64,
    pub usage:     u64,
}

/// Normalized record handed to the sink.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricRecord {
    pub id:          String,
    pub name:        String,
    pub read:        DateTime<Utc>,
    pub num_procs:   u64,
    pub limit:       u64,
    pub max_usage:   u64,
    pub usage:       u64,
    pub online_cpus: u64,
    pub total_usage: u64,
}

/// A decoded message, classified by shape.
#[derive(Debug)]
pub enum Message {
    Containers(Vec<ContainerSummary>),
    Lifecycle(LifecycleEvent),
    Stats(Value),
    Other(Value),
}

impl Message {
    pub fn classify(value: Value) -> Result<Self, Error> {
        if let Value::Array(entries) = value {
            return Ok(Self::Containers(containers(entries)));
        }

        if value.get("Type").and_then(Value::as_str) == Some("container") {
            let event = serde_json::from_value(value).map_err(|e| {
                Error::Decode(format!("invalid lifecycle event: {}", e))
            })?;
            return Ok(Self::Lifecycle(event));
        }

        match value.get("read") {
            Some(_) => Ok(Self::Stats(value)),
            None    => Ok(Self::Other(value)),
        }
    }
}

fn containers(entries: Vec<Value>) -> Vec<ContainerSummary> {
    entries.into_iter().filter_map(|entry| {
        match serde_json::from_value(entry) {
            Ok(summary) => Some(summary),
            Err(e)      => {
                debug!("skipping container entry: {}", e);
                None
            }
        }
    }).collect()
}

pub fn strip_separator(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn classify_listing() {
        let value = json!([
            {"Id": "c1", "Names": ["/web-1"], "State": "running", "Created": 1600000000},
            {"Names": ["/no-id"]},
        ]);

        match Message::classify(value).unwrap() {
            Message::Containers(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].id, "c1");
                assert_eq!(list[0].name(), "web-1");
                assert_eq!(list[0].created.unwrap().timestamp(), 1600000000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classify_lifecycle() {
        let value = json!({
            "Type":   "container",
            "status": "die",
            "id":     "c1",
            "from":   "nginx",
            "time":   1600000000,
        });

        match Message::classify(value).unwrap() {
            Message::Lifecycle(event) => {
                assert_eq!(event.status, Status::Other("die".into()));
                assert_eq!(event.from, "nginx");
                assert_eq!(event.name(), "");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classify_invalid_lifecycle() {
        let value = json!({"Type": "container", "status": "start"});
        assert!(matches!(Message::classify(value), Err(Error::Decode(_))));
    }

    #[test]
    fn classify_other() {
        let value = json!({"Type": "network", "status": "connect"});
        assert!(matches!(Message::classify(value), Ok(Message::Other(_))));
    }
}
