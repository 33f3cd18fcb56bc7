/// Failure conditions of the forwarding pipeline.
///
/// None of these stop the agent; they are logged where they occur and the
/// offending unit, sample or write is dropped or retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error on {path}: {reason}")]
    Transport { path: String, reason: String },

    #[error("undecodable payload: {0}")]
    Decode(String),

    #[error("malformed stats sample: {0}")]
    MalformedSample(String),

    #[error("sink write failed: {0}")]
    SinkWrite(String),

    #[error("invalid store '{0}'")]
    Store(String),
}

impl Error {
    pub fn transport<E: ToString>(path: &str, reason: E) -> Self {
        Self::Transport {
            path:   path.to_owned(),
            reason: reason.to_string(),
        }
    }
}
