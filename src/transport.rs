use std::path::{Path, PathBuf};
use std::time::Duration;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use hyper::{Body, Request};
use hyper::client::conn;
use hyper::header::HOST;
use log::{debug, warn};
use tokio::net::UnixStream;
use tokio::time::sleep;
use crate::error::Error;

pub type Chunks = BoxStream<'static, Result<Bytes, Error>>;

/// Source of raw byte chunks, one independent subscription per path.
pub trait Transport: Send + Sync + 'static {
    fn subscribe(&self, path: &str) -> Chunks;

    /// Long-lived subscription that is reopened whenever it fails or ends.
    fn follow(&self, path: &str) -> Chunks {
        self.subscribe(path)
    }
}

/// Subscription paths for one runtime API version.
#[derive(Clone, Debug)]
pub struct Paths {
    version: String,
}

impl Paths {
    pub fn new(version: &str) -> Self {
        let version = version.trim_matches('/').to_owned();
        Self { version }
    }

    pub fn containers(&self) -> String {
        format!("/{}/containers/json", self.version)
    }

    pub fn events(&self) -> String {
        format!("/{}/events", self.version)
    }

    pub fn stats(&self, id: &str) -> String {
        format!("/{}/containers/{}/stats", self.version, id)
    }
}

/// HTTP/1 over the runtime's unix control socket.
pub struct DockerSocket {
    socket: PathBuf,
}

const MIN_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

impl DockerSocket {
    pub fn new<P: AsRef<Path>>(socket: P) -> Self {
        let socket = socket.as_ref().to_owned();
        Self { socket }
    }
}

impl Transport for DockerSocket {
    fn subscribe(&self, path: &str) -> Chunks {
        let socket = self.socket.clone();
        let path   = path.to_owned();

        stream::once(async move {
            let body = get(&socket, &path).await?;
            Ok::<_, Error>(body.map_err(move |e| Error::transport(&path, e)))
        }).try_flatten().boxed()
    }

    fn follow(&self, path: &str) -> Chunks {
        let follow = Follow {
            socket:  self.socket.clone(),
            path:    path.to_owned(),
            body:    None,
            backoff: MIN_BACKOFF,
        };

        stream::unfold(follow, Follow::next).boxed()
    }
}

/// Reconnecting body reader; errors are logged, never yielded.
struct Follow {
    socket:  PathBuf,
    path:    String,
    body:    Option<Body>,
    backoff: Duration,
}

impl Follow {
    async fn next(mut self) -> Option<(Result<Bytes, Error>, Self)> {
        loop {
            let mut body = match self.body.take() {
                Some(body) => body,
                None       => match get(&self.socket, &self.path).await {
                    Ok(body) => body,
                    Err(e)   => {
                        self.pause(e).await;
                        continue;
                    }
                },
            };

            match body.next().await {
                Some(Ok(chunk)) => {
                    self.body    = Some(body);
                    self.backoff = MIN_BACKOFF;
                    return Some((Ok(chunk), self));
                }
                Some(Err(e)) => self.pause(Error::transport(&self.path, e)).await,
                None         => self.pause(Error::transport(&self.path, "stream ended")).await,
            }
        }
    }

    async fn pause(&mut self, e: Error) {
        warn!("{}, reconnecting in {:?}", e, self.backoff);
        sleep(self.backoff).await;
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
    }
}

async fn get(socket: &Path, path: &str) -> Result<Body, Error> {
    let stream = connect(socket).await;

    let (mut sender, connection) = conn::handshake(stream).await.map_err(|e| {
        Error::transport(path, e)
    })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("connection closed: {}", e);
        }
    });

    let req = Request::get(path)
        .header(HOST, "docker")
        .body(Body::empty())
        .map_err(|e| Error::transport(path, e))?;

    let res = sender.send_request(req).await.map_err(|e| {
        Error::transport(path, e)
    })?;

    match res.status() {
        status if status.is_success() => Ok(res.into_body()),
        status                        => Err(Error::transport(path, status)),
    }
}

async fn connect(socket: &Path) -> UnixStream {
    let mut backoff = MIN_BACKOFF;

    loop {
        match UnixStream::connect(socket).await {
            Ok(stream) => return stream,
            Err(e)     => {
                warn!("connect to {} failed: {}, retrying in {:?}", socket.display(), e, backoff);
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
