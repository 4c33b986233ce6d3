use thiserror::Error;

use crate::session::Status;

/// Failures at the peer transport boundary.
///
/// None of these end a race: connection failures drop the session back to
/// single player and malformed frames are logged and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("no open connection")]
    NotConnected,
}

/// Sentence retrieval failures, always absorbed by the fallback corpus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentFetchError {
    #[error("content source unavailable: {0}")]
    Unavailable(String),

    #[error("content source returned no usable sentences")]
    Empty,
}

/// Misuse of the session state machine by its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while {status}")]
    InvalidTransition {
        action: &'static str,
        status: Status,
    },

    #[error("waiting for a peer to connect")]
    PeerNotConnected,

    #[error("only the host chooses the sentences")]
    NotContentAuthority,

    #[error("no sentences to play")]
    NoContent,
}
