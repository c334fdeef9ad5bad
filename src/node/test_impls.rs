use super::*;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, client_async, MaybeTlsStream, WebSocketStream};

impl Node {
    /// A node which was never opened: every send fails.
    pub(crate) fn detached(id: NodeId) -> Arc<Self> {
        Arc::new(Self::new(
            id,
            NodeConfig::new("http://127.0.0.1:1", "ws://127.0.0.1:1", "youshallnotpass"),
            ClientData {
                shard_count: 1,
                user_id: UserId(1),
            },
            &Config::default(),
        ))
    }

    /// A node whose write half is wired to a local socket, returned as the
    /// remote end.
    ///
    /// No receive task runs for the node.
    pub(crate) async fn loopback(id: NodeId) -> (Arc<Self>, WebSocketStream<TcpStream>) {
        let node = Self::detached(id);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("ws://{}/", addr);

        let (client, remote) = tokio::join!(
            async {
                let tcp = TcpStream::connect(addr).await.unwrap();
                client_async(url.as_str(), MaybeTlsStream::Plain(tcp))
                    .await
                    .unwrap()
                    .0
            },
            async {
                let (tcp, _) = listener.accept().await.unwrap();
                accept_async(tcp).await.unwrap()
            },
        );

        let (sink, _stream) = ws::split(client);
        *node.sink.lock().await = Some(sink);
        node.set_state(NodeState::Connected);

        (node, remote)
    }
}
