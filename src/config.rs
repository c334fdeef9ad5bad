use crate::constants::DEFAULT_CLIENT_NAME;
use derivative::Derivative;
use std::time::Duration;
use tracing::Dispatch;

/// Connection details for a single Lavalink node.
#[derive(Clone, Derivative, Eq, PartialEq)]
#[derivative(Debug)]
pub struct NodeConfig {
    /// Base URL of the node's REST server.
    ///
    /// This value is expected without a trailing slash, e.g.,
    /// `http://localhost:2333`.
    pub rest: String,
    /// URL of the node's WebSocket server.
    ///
    /// This value is expected without a trailing slash, e.g.,
    /// `ws://localhost:2333`.
    pub websocket: String,
    #[derivative(Debug = "ignore")]
    /// Shared secret sent as the `Authorization` header over both
    /// the REST and WebSocket channels.
    pub password: String,
}

impl NodeConfig {
    /// Creates a node configuration from its REST base, WebSocket URL, and password.
    pub fn new(
        rest: impl Into<String>,
        websocket: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            rest: rest.into(),
            websocket: websocket.into(),
            password: password.into(),
        }
    }
}

/// Configuration shared by every node and player in a [`Lavalink`] instance.
///
/// [`Lavalink`]: crate::Lavalink
#[derive(Clone, Derivative)]
#[derivative(Debug)]
#[non_exhaustive]
pub struct Config {
    /// Configures the maximum amount of time to wait for a node's WebSocket
    /// dial and handshake, both on first open and on reconnect.
    ///
    /// Defaults to `None`, leaving timeouts to the underlying transport.
    pub connect_timeout: Option<Duration>,

    /// Name announced to nodes in the `Client-Name` handshake header.
    ///
    /// Defaults to [`DEFAULT_CLIENT_NAME`].
    ///
    /// [`DEFAULT_CLIENT_NAME`]: crate::constants::DEFAULT_CLIENT_NAME
    pub client_name: String,

    #[derivative(Debug = "ignore")]
    /// Logging sink used by every background task spawned on behalf of this
    /// configuration.
    ///
    /// If set to `None`, tasks log through whichever subscriber is the
    /// default at the time they run.
    pub dispatch: Option<Dispatch>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            client_name: DEFAULT_CLIENT_NAME.into(),
            dispatch: None,
        }
    }
}

impl Config {
    /// Sets this `Config`'s timeout for establishing a node connection.
    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets this `Config`'s announced client name.
    #[must_use]
    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// Sets this `Config`'s logging sink for background tasks.
    #[must_use]
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn node_debug_hides_password() {
        let cfg = NodeConfig::new("http://localhost:2333", "ws://localhost:2333", "hunter2");

        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
