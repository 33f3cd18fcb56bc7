use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use futures::future;
use futures::stream::StreamExt;
use log::{debug, info, trace, warn};
use serde_json::Value;
use tokio::sync::mpsc::{channel, unbounded_channel, Receiver, Sender, UnboundedReceiver};
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use crate::data::{Message, Status};
use crate::decode::messages;
use crate::error::Error;
use crate::forward::Forwarder;
use crate::normalize::normalize;
use crate::registry::Registry;
use crate::sink::Sink;
use crate::transport::{Paths, Transport};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Stopped,
    Running,
}

/// Subscription a decoded message arrived on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Source {
    Listing,
    Events,
    Stats(String),
}

enum Delivery {
    Message(Source, Result<Value, Error>),
    Closed(Source),
}

/// Orchestrates subscriptions, the registry and forwarding.
///
/// Every subscription runs as its own task that decodes its chunks and sends
/// the results to a single channel. `run` consumes that channel and performs
/// all registry updates, normalization and forwarding sequentially.
pub struct Agent<T, S> {
    transport: Arc<T>,
    paths:     Paths,
    state:     State,
    registry:  Registry,
    forwarder: Option<Forwarder<S>>,
    drain:     Duration,
    ticker:    Option<Interval>,
    streams:   HashSet<String>,
    tx:        Sender<Delivery>,
    rx:        Receiver<Delivery>,
    watch:     UnboundedReceiver<String>,
    cancel:    CancellationToken,
}

const DEFAULT_DRAIN: Duration = Duration::from_secs(60);
const MIN_DRAIN:     Duration = Duration::from_secs(1);

impl<T: Transport, S: Sink> Agent<T, S> {
    pub fn new(transport: T, version: &str, forwarder: Option<Forwarder<S>>) -> Self {
        let (tx, rx)    = channel(1024);
        let (wtx, wrx)  = unbounded_channel();

        Self {
            transport: Arc::new(transport),
            paths:     Paths::new(version),
            state:     State::Stopped,
            registry:  Registry::new(wtx),
            forwarder: forwarder,
            drain:     DEFAULT_DRAIN,
            ticker:    None,
            streams:   HashSet::new(),
            tx:        tx,
            rx:        rx,
            watch:     wrx,
            cancel:    CancellationToken::new(),
        }
    }

    /// Interval of the periodic buffer drain, at least one second.
    pub fn with_drain_interval(mut self, drain: Duration) -> Self {
        self.drain = drain.max(MIN_DRAIN);
        self
    }

    /// Token that stops a running agent when cancelled.
    pub fn stopper(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn forwarder(&self) -> Option<&Forwarder<S>> {
        self.forwarder.as_ref()
    }

    /// Open the listing subscription. Once the listing has been loaded the
    /// event stream is opened and stats are polled for every container
    /// already tracked. No effect unless stopped.
    pub fn start(&mut self) {
        if self.state != State::Stopped || self.cancel.is_cancelled() {
            return;
        }

        info!("starting agent");
        self.state = State::Running;

        let mut ticker = interval(self.drain);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);

        self.subscribe(Source::Listing);
    }

    /// Cancel every subscription. Buffered records are discarded.
    pub fn stop(&mut self) {
        if self.state == State::Running {
            let buffered = self.forwarder.as_ref().map_or(0, Forwarder::len);
            info!("stopping agent, discarding {} buffered records", buffered);
        }

        self.state = State::Stopped;
        self.cancel.cancel();
    }

    pub async fn run(mut self) -> Result<()> {
        self.start();

        while self.state == State::Running {
            self.step().await;
        }

        Ok(())
    }

    /// Wait for and handle the next delivery, stats watch, retry deadline,
    /// drain tick or cancellation.
    pub async fn step(&mut self) {
        let retry = self.forwarder.as_ref().and_then(Forwarder::deadline);

        tokio::select! {
            _ = self.cancel.cancelled() => self.stop(),
            Some(delivery) = self.rx.recv() => match delivery {
                Delivery::Message(source, item) => self.dispatch(source, item).await,
                Delivery::Closed(source)        => self.closed(source),
            },
            Some(id) = self.watch.recv() => self.subscribe(Source::Stats(id)),
            _ = wait(retry) => self.retry().await,
            _ = tick(&mut self.ticker) => {
                if let Some(forwarder) = self.forwarder.as_mut() {
                    forwarder.drain();
                }
            }
        }
    }

    /// Route one decoded message.
    pub async fn dispatch(&mut self, source: Source, item: Result<Value, Error>) {
        let message = match item.and_then(Message::classify) {
            Ok(message) => message,
            Err(e)      => {
                warn!("{}: {}", source, e);
                return;
            }
        };

        match message {
            Message::Containers(containers) => self.registry.bulk_load(containers),
            Message::Lifecycle(event) => match &event.status {
                Status::Start     => self.registry.on_start(&event),
                Status::Stop      => {
                    self.registry.on_stop(&event.id);
                }
                Status::Other(s)  => debug!("unhandled status {} for {}", s, event.id),
            },
            Message::Stats(sample) => self.collect(&source, sample).await,
            Message::Other(_)      => trace!("{}: ignoring message", source),
        }
    }

    async fn collect(&mut self, source: &Source, sample: Value) {
        let record = match normalize(sample) {
            Ok(record) => record,
            Err(e)     => {
                warn!("{}: {}", source, e);
                return;
            }
        };

        // stats streams were opened for a tracked id and stay valid after
        // its stop event
        let tracked = match source {
            Source::Stats(_) => true,
            _                => self.registry.is_known(&record.id),
        };

        if !tracked {
            debug!("{}: stats for unknown container {}", source, record.id);
            return;
        }

        match self.forwarder.as_mut() {
            Some(forwarder) => forwarder.forward(record).await,
            None            => trace!("forwarding disabled, dropping {}", record.id),
        }
    }

    async fn retry(&mut self) {
        if let Some(forwarder) = self.forwarder.as_mut() {
            forwarder.retry().await;
        }
    }

    fn closed(&mut self, source: Source) {
        match source {
            Source::Listing => {
                debug!("container listing loaded");
                self.subscribe(Source::Events);
                self.poll();
            }
            Source::Events    => warn!("event stream ended"),
            Source::Stats(id) => {
                self.streams.remove(&id);
            }
        }
    }

    fn poll(&mut self) {
        let ids = self.registry.ids();
        debug!("polling stats for {} containers", ids.len());

        for id in ids {
            self.subscribe(Source::Stats(id));
        }
    }

    fn subscribe(&mut self, source: Source) {
        if self.state != State::Running {
            return;
        }

        let path = match &source {
            Source::Listing   => self.paths.containers(),
            Source::Events    => self.paths.events(),
            Source::Stats(id) => {
                if !self.streams.insert(id.clone()) {
                    trace!("stats for {} already subscribed", id);
                    return;
                }
                self.paths.stats(id)
            }
        };

        debug!("subscribing to {}", path);

        let chunks = match source {
            Source::Events => self.transport.follow(&path),
            _              => self.transport.subscribe(&path),
        };

        let mut messages = messages(chunks).boxed();
        let cancel = self.cancel.child_token();
        let tx     = self.tx.clone();

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => return,
                    item = messages.next() => item,
                };

                let delivery = match item {
                    Some(item) => Delivery::Message(source.clone(), item),
                    None       => break,
                };

                if tx.send(delivery).await.is_err() {
                    return;
                }
            }

            debug!("subscription {} closed", path);
            let _ = tx.send(Delivery::Closed(source)).await;
        });
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing   => write!(f, "listing"),
            Self::Events    => write!(f, "events"),
            Self::Stats(id) => write!(f, "stats {}", id),
        }
    }
}

async fn wait(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None           => future::pending().await,
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}
