// Error types shared by the library modules

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::PlaybackState;

/// Failure to build a `Song` or `PlaybackStatus` from player fields
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidField { field: &'static str, value: String },
    /// The player reported a state we do not know about
    #[error("protocol violation: unknown player state '{0}'")]
    UnknownState(String),
}

/// An observation the scrobbling machine refuses to act on
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MachineError {
    #[error("protocol violation: player is {0} but reports no current song")]
    MissingSong(PlaybackState),
}

/// Errors raised by a remote scrobbling service
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("service error: {0}")]
    Service(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Transient errors are worth retrying later; anything else is fatal
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Service(_) | Self::Network(_) | Self::MalformedResponse(_)
        )
    }
}

/// Failure to persist or read back the scrobble queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode scrobble record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl QueueError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("persistence failure: {0}")]
    Persistence(#[from] QueueError),
    #[error("fatal transport failure: {0}")]
    Transport(TransportError),
}

/// Errors talking to MPD
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unexpected greeting from MPD: {0}")]
    Handshake(String),
    #[error("MPD refused command: {0}")]
    Ack(String),
    #[error("connection closed by MPD")]
    Closed,
    #[error(transparent)]
    Parse(#[from] ParseError),
}
