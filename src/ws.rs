use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt,
    StreamExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Error as JsonError;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{
        error::Error as TungsteniteError,
        handshake::client::{Request, Response},
        protocol::{CloseFrame, WebSocketConfig as Config},
        Message,
    },
    MaybeTlsStream,
    WebSocketStream,
};
use tracing::{debug, instrument};

type Inner = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a node's WebSocket.
pub(crate) struct WsSink(SplitSink<Inner, Message>);

/// Read half of a node's WebSocket.
pub(crate) struct WsStream(SplitStream<Inner>);

#[instrument(skip(request), fields(uri = %request.uri()))]
pub(crate) async fn connect(request: Request) -> Result<(WsSink, WsStream, Response)> {
    let (stream, response) = tokio_tungstenite::connect_async_with_config(
        request,
        Some(Config {
            max_message_size: None,
            max_frame_size: None,
            ..Default::default()
        }),
        true,
    )
    .await?;

    let (sink, stream) = split(stream);

    Ok((sink, stream, response))
}

pub(crate) fn split(stream: Inner) -> (WsSink, WsStream) {
    let (sink, stream) = stream.split();

    (WsSink(sink), WsStream(stream))
}

impl WsStream {
    /// Waits for the next frame.
    ///
    /// `Ok(None)` is returned for control frames, which tungstenite
    /// answers internally.
    pub(crate) async fn recv_json<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.0.next().await {
            Some(Ok(msg)) => convert_ws_message(msg),
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::WsClosed(None)),
        }
    }
}

impl WsSink {
    pub(crate) async fn send_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        Ok(serde_json::to_string(value)
            .map(Message::Text)
            .map_err(Error::from)
            .map(|m| self.0.send(m))?
            .await?)
    }

    pub(crate) async fn close(&mut self) -> Result<()> {
        Ok(self.0.close().await?)
    }
}

/// Convenience type for WebSocket transport error handling.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors on a node's WebSocket transport.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A frame could not be (de)serialised.
    Json(JsonError),

    /// Lavalink only sends text frames, so a binary frame is an unknown payload.
    UnexpectedBinaryMessage(Vec<u8>),

    /// Error from the underlying WebSocket implementation.
    Ws(TungsteniteError),

    /// The remote end closed the socket.
    WsClosed(Option<CloseFrame<'static>>),

    /// The node has no open socket to write to.
    NotConnected,
}

impl Error {
    /// Whether this error means the socket is unusable, rather than that a
    /// single frame was bad.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, Error::Ws(_) | Error::WsClosed(_) | Error::NotConnected)
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e)
    }
}

#[inline]
pub(crate) fn convert_ws_message<T: DeserializeOwned>(message: Message) -> Result<Option<T>> {
    Ok(match message {
        Message::Text(payload) => Some(serde_json::from_str(&payload).map_err(|e| {
            debug!("Unexpected JSON: {}. Payload: {}", e, payload);
            e
        })?),
        Message::Binary(bytes) => {
            return Err(Error::UnexpectedBinaryMessage(bytes));
        },
        Message::Close(frame) => {
            return Err(Error::WsClosed(frame));
        },
        // Ping/Pong message behaviour is internally handled by tungstenite.
        _ => None,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::Value;

    #[test]
    fn binary_frames_are_rejected() {
        let out = convert_ws_message::<Value>(Message::Binary(vec![1, 2, 3]));

        assert!(matches!(out, Err(Error::UnexpectedBinaryMessage(_))));
        assert!(!out.unwrap_err().is_fatal());
    }

    #[test]
    fn bad_json_is_not_fatal() {
        let out = convert_ws_message::<Value>(Message::Text("{not json".into()));

        assert!(matches!(out, Err(Error::Json(_))));
        assert!(!out.unwrap_err().is_fatal());
    }

    #[test]
    fn close_frames_end_the_stream() {
        let out = convert_ws_message::<Value>(Message::Close(None));

        assert!(matches!(out, Err(Error::WsClosed(None))));
        assert!(out.unwrap_err().is_fatal());
    }

    #[test]
    fn control_frames_are_skipped() {
        let out = convert_ws_message::<Value>(Message::Ping(vec![]));

        assert!(matches!(out, Ok(None)));
    }
}
