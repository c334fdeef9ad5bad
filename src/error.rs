//! Player, registry, and transport error handling.

pub use crate::{
    codec::DecodeError,
    node::error::{Error as ConnectionError, Result as ConnectionResult},
    ws::Error as WsError,
};
use crate::constants::MAX_VOLUME;
use reqwest::Error as RestError;
use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Errors returned by operations on a [`Lavalink`] client, its nodes, and
/// its players.
///
/// [`Lavalink`]: crate::Lavalink
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A track descriptor could not be decoded.
    Decode(DecodeError),
    /// A command could not be written to a node's socket.
    ///
    /// Cached player state may already reflect the command. A node's
    /// `playerUpdate` only re-syncs `time` and `position`, so other fields
    /// keep the unsent value until another command replaces it.
    Transport(WsError),
    /// A node could not be opened.
    Connection(ConnectionError),
    /// A REST query to a node failed.
    Rest(RestError),
    /// A node sent a message with an unrecognised opcode.
    UnknownPayload,
    /// The given node is not registered with this client.
    NodeNotFound,
    /// No player exists for the given guild.
    PlayerNotFound,
    /// No nodes are registered with this client.
    NoNodesAvailable,
    /// The node which owned this player has been removed.
    ///
    /// The player must be destroyed (which always succeeds locally) and
    /// recreated on another node.
    NodeLost,
    /// The requested volume lay outside `0..=1000`.
    VolumeOutOfRange(i32),
    /// An [`EventHandler`] callback failed.
    ///
    /// [`EventHandler`]: crate::events::EventHandler
    Handler(Box<dyn StdError + Send + Sync>),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::Decode(e) => write!(f, "failed to decode track: {}", e),
            Error::Transport(e) => write!(f, "failed to send command: {:?}", e),
            Error::Connection(e) => write!(f, "{}", e),
            Error::Rest(e) => write!(f, "REST request failed: {}", e),
            Error::UnknownPayload => write!(f, "node sent an unknown payload"),
            Error::NodeNotFound => write!(f, "node is not registered"),
            Error::PlayerNotFound => write!(f, "no player exists for this guild"),
            Error::NoNodesAvailable => write!(f, "no nodes are available"),
            Error::NodeLost => write!(f, "player's node has been removed"),
            Error::VolumeOutOfRange(v) => {
                write!(f, "volume {} lies outside 0..={}", v, MAX_VOLUME)
            },
            Error::Handler(e) => write!(f, "event handler failed: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            Error::Connection(e) => Some(e),
            Error::Rest(e) => Some(e),
            Error::Handler(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        Error::Transport(e)
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Error::Connection(e)
    }
}

impl From<RestError> for Error {
    fn from(e: RestError) -> Self {
        Error::Rest(e)
    }
}

/// Convenience type for client error handling.
pub type Result<T> = std::result::Result<T, Error>;
