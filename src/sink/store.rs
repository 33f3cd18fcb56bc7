use std::str::FromStr;
use anyhow::{Error, Result};
use async_trait::async_trait;
use crate::data::MetricRecord;
use crate::error::Error as StoreError;
use super::{Args, InfluxClient, PrometheusClient, Sink};

/// Configured store backend.
pub enum Store {
    Influx(InfluxClient),
    Prometheus(PrometheusClient),
    Stdout,
}

impl Store {
    pub fn open(kind: &str, options: &str) -> Result<Self> {
        format!("{},{}", kind, options).parse()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Influx(_)     => "influx",
            Self::Prometheus(_) => "prometheus",
            Self::Stdout        => "stdout",
        }
    }
}

#[async_trait]
impl Sink for Store {
    async fn write(&self, record: &MetricRecord) -> Result<()> {
        match self {
            Self::Influx(c)     => c.send(record).await?,
            Self::Prometheus(c) => c.send(record).await?,
            Self::Stdout        => println!("{}", serde_json::to_string(record)?),
        }
        Ok(())
    }
}

impl FromStr for Store {
    type Err = Error;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        match Args::parse(arg) {
            ("influx",     args) => influx(args),
            ("prometheus", args) => prometheus(args),
            ("stdout",    _args) => Ok(Self::Stdout),
            (kind,        _args) => Err(StoreError::Store(kind.to_owned()).into()),
        }
    }
}

fn influx(args: Args) -> Result<Store> {
    Ok(Store::Influx(InfluxClient::new(args)?))
}

fn prometheus(args: Args) -> Result<Store> {
    Ok(Store::Prometheus(PrometheusClient::new(args)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_known_stores() {
        let store = Store::open("influx", "url=http://influx:8086,db=docker").unwrap();
        assert_eq!(store.kind(), "influx");

        let store = Store::open("prometheus", "endpoint=http://prom/api/v1/write").unwrap();
        assert_eq!(store.kind(), "prometheus");

        let store = Store::open("stdout", "").unwrap();
        assert_eq!(store.kind(), "stdout");
    }

    #[test]
    fn unknown_store() {
        let err = Store::open("graphite", "").err().unwrap();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Store(kind)) if kind == "graphite"));
    }

    #[test]
    fn influx_without_options() {
        let store = Store::open("influx", "").unwrap();
        assert_eq!(store.kind(), "influx");
    }
}
