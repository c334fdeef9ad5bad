//! Connection errors and convenience types.

use crate::{constants::MIN_MAJOR_VERSION, ws::Error as WsError};
use std::{error::Error as StdError, fmt};
use tokio::time::error::Elapsed;
use tokio_tungstenite::tungstenite::error::Error as TungsteniteError;

/// Errors encountered while opening a WebSocket session to a Lavalink node.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configured WebSocket URL was invalid.
    EndpointUrl,
    /// A configured value could not be sent as a handshake header.
    InvalidHeader,
    /// The node's handshake response did not state a usable major version.
    MissingVersion,
    /// The node's major version is older than this library supports.
    IncompatibleVersion(u32),
    /// Error communicating with the node over WebSocket.
    Ws(WsError),
    /// Connection attempt timed out.
    TimedOut,
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Error {
        Error::Ws(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e.into())
    }
}

impl From<Elapsed> for Error {
    fn from(_e: Elapsed) -> Error {
        Error::TimedOut
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to connect to Lavalink node: ")?;
        use Error::*;
        match self {
            EndpointUrl => write!(f, "websocket URL was invalid"),
            InvalidHeader => write!(f, "handshake header value was invalid"),
            MissingVersion => write!(f, "node did not report its major version"),
            IncompatibleVersion(v) => write!(
                f,
                "node reports major version {}, but at least {} is required",
                v, MIN_MAJOR_VERSION
            ),
            Ws(e) => write!(f, "websocket issue ({:?}).", e),
            TimedOut => write!(f, "connection attempt timed out"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Ws(WsError::Ws(e)) => Some(e),
            Error::Ws(WsError::Json(e)) => Some(e),
            _ => None,
        }
    }
}

/// Convenience type for node connection error handling.
pub type Result<T> = std::result::Result<T, Error>;
