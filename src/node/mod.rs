//! Connections to individual Lavalink nodes.
//!
//! Each [`Node`] owns at most one WebSocket session at a time. Inbound frames
//! are consumed by a single background task per node, while outbound commands
//! may be sent from any task: writes are serialised through an async mutex so
//! that frames are never interleaved.

pub mod error;
mod rest;
pub(crate) mod tasks;
#[cfg(test)]
pub(crate) mod test_impls;

pub use self::error::{Error as ConnectionError, Result as ConnectionResult};

use crate::{
    constants::*,
    id::{NodeId, UserId},
    manager::{Registry, RegistryMessage},
    model::{OutgoingEvent, Stats},
    ws::{self, Error as WsError, WsSink, WsStream},
    Config,
    NodeConfig,
};
use derivative::Derivative;
use flume::Sender;
use parking_lot::{Mutex as PMutex, RwLock as PRwLock};
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
        Weak,
    },
    time::Duration,
};
use tokio::{spawn, sync::Mutex, task::JoinHandle, time::timeout};
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    handshake::client::Request,
    http::HeaderValue,
};
use tracing::{debug, info, instrument, trace, Dispatch};
use tracing_futures::WithSubscriber;
use url::Url;

/// Connection lifecycle of a [`Node`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum NodeState {
    /// No socket has been opened yet, or the first open failed.
    Disconnected,
    /// The first handshake is in progress.
    Connecting,
    /// A socket is open and its frames are being processed.
    Connected,
    /// The socket failed, and a single reconnect attempt is in progress.
    Reconnecting,
    /// The node has been removed from its registry, and will never reconnect.
    Removed,
}

/// Values sent to every node during the handshake.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ClientData {
    pub shard_count: u64,
    pub user_id: UserId,
}

/// A remote Lavalink node, reachable over WebSocket and REST.
///
/// Nodes are created and owned by a [`Lavalink`] registry. Handles obtained
/// from it (e.g., via [`Lavalink::best_node`]) may outlive the node's
/// membership: check [`state`] before relying on one for long.
///
/// [`Lavalink`]: crate::Lavalink
/// [`Lavalink::best_node`]: crate::Lavalink::best_node
/// [`state`]: Node::state()
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Node {
    id: NodeId,
    config: NodeConfig,
    client: ClientData,
    client_name: String,
    connect_timeout: Option<Duration>,

    /// `f32` load metric, stored as raw bits.
    load: AtomicU32,
    stats: PRwLock<Option<Stats>>,
    state: PRwLock<NodeState>,

    #[derivative(Debug = "ignore")]
    sink: Mutex<Option<WsSink>>,
    #[derivative(Debug = "ignore")]
    task: PMutex<Option<JoinHandle<()>>>,
    #[derivative(Debug = "ignore")]
    http: reqwest::Client,
}

impl Node {
    pub(crate) fn new(id: NodeId, config: NodeConfig, client: ClientData, settings: &Config) -> Self {
        Self {
            id,
            config,
            client,
            client_name: settings.client_name.clone(),
            connect_timeout: settings.connect_timeout,

            load: AtomicU32::new(0f32.to_bits()),
            stats: PRwLock::new(None),
            state: PRwLock::new(NodeState::Disconnected),

            sink: Mutex::new(None),
            task: PMutex::new(None),
            http: reqwest::Client::new(),
        }
    }

    /// Returns this node's registry-local identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the configuration this node was created from.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Returns the node's most recently reported Lavalink CPU load.
    ///
    /// This is `0.0` until the node sends its first stats report.
    pub fn load(&self) -> f32 {
        f32::from_bits(self.load.load(Ordering::Acquire))
    }

    pub(crate) fn set_load(&self, load: f32) {
        self.load.store(load.to_bits(), Ordering::Release);
    }

    /// Returns the node's most recent stats report, if any has arrived.
    pub fn stats(&self) -> Option<Stats> {
        self.stats.read().clone()
    }

    pub(crate) fn update_stats(&self, stats: Stats) {
        self.set_load(stats.cpu.lavalink_load);
        *self.stats.write() = Some(stats);
    }

    /// Returns the current connection state.
    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        let mut current = self.state.write();

        // Removal is terminal.
        if *current != NodeState::Removed {
            *current = state;
        }
    }

    /// Opens this node's socket and starts its receive task.
    #[instrument(skip(self, registry, notify, dispatch), fields(node = %self.id))]
    pub(crate) async fn open(
        self: &Arc<Self>,
        registry: Weak<Registry>,
        notify: Sender<RegistryMessage>,
        dispatch: Option<Dispatch>,
    ) -> ConnectionResult<()> {
        self.set_state(NodeState::Connecting);

        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_state(NodeState::Disconnected);
                return Err(e);
            },
        };

        self.set_state(NodeState::Connected);

        let runner = tasks::runner(Arc::clone(self), stream, registry, notify);
        let handle = match dispatch {
            Some(dispatch) => spawn(runner.with_subscriber(dispatch)),
            None => spawn(runner),
        };
        *self.task.lock() = Some(handle);

        info!("Node {} opened at {}.", self.id, self.config.websocket);

        Ok(())
    }

    /// Dials the node and performs the handshake, replacing any previous
    /// write half with the new socket's.
    #[instrument(skip(self), fields(node = %self.id, url = %self.config.websocket))]
    pub(crate) async fn connect(&self) -> ConnectionResult<WsStream> {
        if let Some(t) = self.connect_timeout {
            timeout(t, self.connect_inner()).await?
        } else {
            self.connect_inner().await
        }
    }

    async fn connect_inner(&self) -> ConnectionResult<WsStream> {
        let request = self.handshake_request()?;
        let (sink, stream, response) = ws::connect(request).await?;

        let version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok())
            .ok_or(ConnectionError::MissingVersion)?;

        if version < MIN_MAJOR_VERSION {
            return Err(ConnectionError::IncompatibleVersion(version));
        }

        debug!("Node {} reports major version {}.", self.id, version);

        *self.sink.lock().await = Some(sink);

        Ok(stream)
    }

    fn handshake_request(&self) -> ConnectionResult<Request> {
        let url = Url::parse(&self.config.websocket).map_err(|_| ConnectionError::EndpointUrl)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectionError::EndpointUrl);
        }

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|_| ConnectionError::EndpointUrl)?;

        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION_HEADER, header_value(&self.config.password)?);
        headers.insert(
            NUM_SHARDS_HEADER,
            header_value(&self.client.shard_count.to_string())?,
        );
        headers.insert(
            USER_ID_HEADER,
            header_value(&self.client.user_id.to_string())?,
        );
        headers.insert(CLIENT_NAME_HEADER, header_value(&self.client_name)?);

        Ok(request)
    }

    /// Sends one command frame to the node.
    pub(crate) async fn send(&self, event: &OutgoingEvent) -> Result<(), WsError> {
        self.send_after(event, || {}).await
    }

    /// Sends one command frame to the node, running `before` once this node's
    /// writer is held.
    ///
    /// `before` runs even if the node has no socket.
    pub(crate) async fn send_after(
        &self,
        event: &OutgoingEvent,
        before: impl FnOnce(),
    ) -> Result<(), WsError> {
        let mut sink = self.sink.lock().await;
        before();

        match sink.as_mut() {
            Some(sink) => {
                trace!("Node {} <- {}.", self.id, event.op());
                sink.send_json(event).await
            },
            None => Err(WsError::NotConnected),
        }
    }

    /// Closes this node's socket and stops its receive task.
    ///
    /// Closing a node which is already closed, or was never opened, does nothing.
    pub(crate) async fn close(&self) {
        self.set_state(NodeState::Removed);

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("Node {} did not close cleanly: {:?}.", self.id, e);
            }
            info!("Node {} closed.", self.id);
        }

        self.abort();
    }

    /// Stops the receive task without touching the socket.
    pub(crate) fn abort(&self) {
        self.set_state(NodeState::Removed);

        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

fn header_value(value: &str) -> ConnectionResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| ConnectionError::InvalidHeader)
}

#[cfg(test)]
mod test {
    use super::*;

    fn node(url: &str) -> Node {
        Node::new(
            NodeId(3),
            NodeConfig::new("http://localhost:2333", url, "youshallnotpass"),
            ClientData {
                shard_count: 4,
                user_id: UserId(1234),
            },
            &Config::default().client_name("test-client"),
        )
    }

    #[test]
    fn handshake_carries_client_headers() {
        let request = node("ws://localhost:2333").handshake_request().unwrap();
        let headers = request.headers();

        assert_eq!(headers[AUTHORIZATION_HEADER], "youshallnotpass");
        assert_eq!(headers[NUM_SHARDS_HEADER], "4");
        assert_eq!(headers[USER_ID_HEADER], "1234");
        assert_eq!(headers[CLIENT_NAME_HEADER], "test-client");
    }

    #[test]
    fn non_websocket_urls_are_rejected() {
        assert!(matches!(
            node("http://localhost:2333").handshake_request(),
            Err(ConnectionError::EndpointUrl)
        ));
        assert!(matches!(
            node("not a url").handshake_request(),
            Err(ConnectionError::EndpointUrl)
        ));
    }

    #[test]
    fn removal_is_terminal() {
        let node = node("ws://localhost:2333");

        node.abort();
        node.set_state(NodeState::Connected);

        assert_eq!(node.state(), NodeState::Removed);
    }

    #[tokio::test]
    async fn closing_is_idempotent() {
        let node = node("ws://localhost:2333");

        node.close().await;
        node.close().await;

        assert_eq!(node.state(), NodeState::Removed);
        assert!(matches!(
            node.send(&OutgoingEvent::Stop(crate::model::GuildOnly {
                guild_id: crate::id::GuildId(1)
            }))
            .await,
            Err(WsError::NotConnected)
        ));
    }
}
