use std::collections::VecDeque;
use std::time::Duration;
use log::{debug, warn};
use tokio::time::Instant;
use crate::data::MetricRecord;
use crate::error::Error;
use crate::sink::Sink;

/// Ordered retry queue in front of a sink.
///
/// A failed write is appended to the buffer. Each successful write arms a
/// single retry of the oldest buffered record after `delay`; a successful
/// retry re-arms the next one, so the buffer drains one record at a time
/// in submission order. A record leaves the buffer only once the sink has
/// accepted it.
pub struct Forwarder<S> {
    sink:   S,
    buffer: VecDeque<MetricRecord>,
    delay:  Duration,
    limit:  Option<usize>,
    retry:  Option<Instant>,
}

impl<S: Sink> Forwarder<S> {
    pub fn new(sink: S, delay: Duration) -> Self {
        Self {
            sink:   sink,
            buffer: VecDeque::new(),
            delay:  delay,
            limit:  None,
            retry:  None,
        }
    }

    /// Cap the buffer, dropping the oldest record when full. A limit of zero
    /// drops every failed record.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub async fn forward(&mut self, record: MetricRecord) {
        match self.sink.write(&record).await {
            Ok(()) => self.arm(),
            Err(e) => {
                let e = Error::SinkWrite(format!("{:#}", e));
                debug!("buffering record for {}: {}", record.id, e);
                self.push(record);
            }
        }
    }

    /// Retry the oldest buffered record. Called once the deadline passes.
    pub async fn retry(&mut self) {
        self.retry = None;

        let record = match self.buffer.front() {
            Some(record) => record,
            None         => return,
        };

        match self.sink.write(record).await {
            Ok(()) => {
                self.buffer.pop_front();
                self.arm();
            }
            Err(e) => debug!("retry failed, {} records buffered: {:#}", self.buffer.len(), e),
        }
    }

    /// Periodic drain; arms a retry unless one is already pending.
    pub fn drain(&mut self) {
        self.arm();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.retry
    }

    pub fn buffered(&self) -> impl Iterator<Item = &MetricRecord> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn arm(&mut self) {
        if !self.buffer.is_empty() && self.retry.is_none() {
            self.retry = Some(Instant::now() + self.delay);
        }
    }

    fn push(&mut self, record: MetricRecord) {
        if let Some(limit) = self.limit {
            if limit == 0 {
                warn!("buffering disabled, dropping record for {} read at {}", record.id, record.read);
                return;
            }

            while self.buffer.len() >= limit {
                if let Some(dropped) = self.buffer.pop_front() {
                    warn!("buffer full, dropping record for {} read at {}", dropped.id, dropped.read);
                }
            }
        }
        self.buffer.push_back(record);
    }
}
