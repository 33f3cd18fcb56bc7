use std::io::Write;
use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{STANDARD, write::EncoderStringWriter};
use prost::Message;
use reqwest::{Client as HttpClient, Method, Request, Url};
use reqwest::header::{self, HeaderMap, HeaderValue};
use snap::raw::Encoder;
use crate::data::MetricRecord;
use super::{Args, Sink};

/// Prometheus remote-write client, one request per record.
pub struct PrometheusClient {
    client:   HttpClient,
    endpoint: Url,
    prefix:   String,
}

#[derive(Message)]
pub struct WriteRequest {
    #[prost(message, repeated)]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Message)]
pub struct TimeSeries {
    #[prost(message, repeated)]
    pub labels:  Vec<Label>,
    #[prost(message, repeated)]
    pub samples: Vec<Sample>,
}

#[derive(Message, Clone, Eq, Ord, PartialEq, PartialOrd)]
pub struct Label {
    #[prost(string)]
    pub name:  String,
    #[prost(string)]
    pub value: String,
}

#[derive(Message)]
pub struct Sample {
    #[prost(double)]
    pub value:     f64,
    #[prost(int64)]
    pub timestamp: i64,
}

impl PrometheusClient {
    pub fn new(args: Args) -> Result<Self> {
        let endpoint = args.get("endpoint")?;
        let username = args.opt("username");
        let password = args.opt("password");
        let prefix   = args.opt("prefix").unwrap_or("container");
        let timeout  = args.parse_opt::<u64>("timeout")?.unwrap_or(10);

        let endpoint = Url::parse(endpoint)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, "snappy".try_into()?);
        headers.insert(header::CONTENT_TYPE, "application/x-protobuf".try_into()?);
        headers.insert(header::USER_AGENT, env!("CARGO_PKG_NAME").try_into()?);
        headers.insert("X-Prometheus-Remote-Write-Version", "0.1.0".try_into()?);

        if let Some((username, password)) = username.zip(password) {
            let mut buf = "Basic ".to_string();
            let mut enc = EncoderStringWriter::from(&mut buf, STANDARD);
            write!(enc, "{}:{}", username, password)?;
            let value = HeaderValue::from_str(&enc.into_inner())?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = HttpClient::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self {
            client:   client,
            endpoint: endpoint,
            prefix:   prefix.to_owned(),
        })
    }

    pub async fn send(&self, record: &MetricRecord) -> Result<()> {
        let mut buf = Vec::new();
        WriteRequest {
            timeseries: self.series(record),
        }.encode(&mut buf)?;

        let body = Encoder::new().compress_vec(&buf)?;

        let endpoint = self.endpoint.clone();
        let mut req  = Request::new(Method::POST, endpoint);
        *req.body_mut() = Some(body.into());

        let res = self.client.execute(req).await?;

        if !res.status().is_success() {
            let status = res.status();
            let body   = res.text().await?;
            return Err(anyhow!("remote write failed: {} {}", status, body.trim()));
        }

        Ok(())
    }

    fn series(&self, record: &MetricRecord) -> Vec<TimeSeries> {
        let timestamp = record.read.timestamp_millis();

        let gauges = [
            ("num_procs",          record.num_procs),
            ("memory_limit",       record.limit),
            ("memory_max_usage",   record.max_usage),
            ("memory_usage",       record.usage),
            ("online_cpus",        record.online_cpus),
            ("cpu_total_usage",    record.total_usage),
        ];

        gauges.iter().map(|(metric, value)| {
            let mut labels = vec![
                label("__name__", format!("{}_{}", self.prefix, metric)),
                label("id",       record.id.clone()),
                label("name",     record.name.clone()),
            ];
            labels.sort_unstable();

            TimeSeries {
                labels:  labels,
                samples: vec![Sample {
                    value:     *value as f64,
                    timestamp: timestamp,
                }],
            }
        }).collect()
    }
}

#[async_trait]
impl Sink for PrometheusClient {
    async fn write(&self, record: &MetricRecord) -> Result<()> {
        self.send(record).await
    }
}

fn label(name: &str, value: String) -> Label {
    Label {
        name:  name.to_owned(),
        value: value,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use super::*;

    #[test]
    fn series_per_gauge() {
        let args   = Args::options("endpoint=http://prom:9090/api/v1/write,username=u,password=p");
        let client = PrometheusClient::new(args).unwrap();
        let record = MetricRecord {
            id:          "c1".to_owned(),
            name:        "web-1".to_owned(),
            read:        Utc.timestamp_opt(1636545600, 500_000_000).unwrap(),
            num_procs:   3,
            limit:       200,
            max_usage:   150,
            usage:       100,
            online_cpus: 4,
            total_usage: 9000,
        };

        let series = client.series(&record);
        assert_eq!(series.len(), 6);

        let usage = series.iter().find(|s| {
            s.labels.iter().any(|l| l.name == "__name__" && l.value == "container_memory_usage")
        }).unwrap();

        assert_eq!(usage.labels[0].name, "__name__");
        assert_eq!(usage.labels[1], label("id", "c1".to_owned()));
        assert_eq!(usage.labels[2], label("name", "web-1".to_owned()));
        assert_eq!(usage.samples[0].value, 100.0);
        assert_eq!(usage.samples[0].timestamp, 1636545600500);
    }

    #[test]
    fn missing_endpoint() {
        assert!(PrometheusClient::new(Args::default()).is_err());
    }
}
