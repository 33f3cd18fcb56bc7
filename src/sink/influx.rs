use std::fmt::Write;
use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Url};
use reqwest::header::{self, HeaderMap, HeaderValue};
use crate::data::MetricRecord;
use super::{Args, Sink};

const DEFAULT_URL: &str = "http://localhost:8086";
const DEFAULT_DB:  &str = "docker";

/// InfluxDB 1.x line protocol writer.
pub struct InfluxClient {
    client:      HttpClient,
    endpoint:    Url,
    measurement: String,
}

impl InfluxClient {
    pub fn new(args: Args) -> Result<Self> {
        let url         = args.opt("url").unwrap_or(DEFAULT_URL);
        let db          = args.opt("db").unwrap_or(DEFAULT_DB);
        let username    = args.opt("username");
        let password    = args.opt("password");
        let measurement = args.opt("measurement").unwrap_or("docker_stats");
        let timeout     = args.parse_opt::<u64>("timeout")?.unwrap_or(10);

        let mut endpoint = Url::parse(url)?.join("write")?;
        endpoint.query_pairs_mut()
            .append_pair("db", db)
            .append_pair("precision", "ns");

        if let Some((username, password)) = username.zip(password) {
            endpoint.query_pairs_mut()
                .append_pair("u", username)
                .append_pair("p", password);
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static(env!("CARGO_PKG_NAME")));

        let client = HttpClient::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self {
            client:      client,
            endpoint:    endpoint,
            measurement: measurement.to_owned(),
        })
    }

    pub async fn send(&self, record: &MetricRecord) -> Result<()> {
        let body = line(&self.measurement, record);
        let res  = self.client.post(self.endpoint.clone()).body(body).send().await?;

        if !res.status().is_success() {
            let status = res.status();
            let body   = res.text().await?;
            return Err(anyhow!("influx write failed: {} {}", status, body.trim()));
        }

        Ok(())
    }
}

#[async_trait]
impl Sink for InfluxClient {
    async fn write(&self, record: &MetricRecord) -> Result<()> {
        self.send(record).await
    }
}

fn line(measurement: &str, record: &MetricRecord) -> String {
    let mut line = escape(measurement, false);

    let _ = write!(line, ",id={}", escape(&record.id, true));

    // empty tag values are rejected
    if !record.name.is_empty() {
        let _ = write!(line, ",name={}", escape(&record.name, true));
    }

    let _ = write!(line, " num_procs={}i,limit={}i,max_usage={}i,usage={}i,online_cpus={}i,total_usage={}i",
        record.num_procs,
        record.limit,
        record.max_usage,
        record.usage,
        record.online_cpus,
        record.total_usage,
    );

    if let Some(ns) = record.read.timestamp_nanos_opt() {
        let _ = write!(line, " {}", ns);
    }

    line
}

fn escape(value: &str, tag: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ',' | ' '       => escaped.push('\\'),
            '=' if tag      => escaped.push('\\'),
            _               => (),
        }
        escaped.push(c);
    }
    escaped
}
