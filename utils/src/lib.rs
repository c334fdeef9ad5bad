//! Test support: descriptor construction, a scriptable mock node, and a one-shot REST responder.

use byteorder::{BigEndian, WriteBytesExt};
use flume::{Receiver, Sender};
use futures::{SinkExt, StreamExt};
use std::{io::Write, net::SocketAddr};
use tokio::{
    net::{TcpListener, TcpStream},
    spawn,
    task::JoinHandle,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::{HeaderMap, HeaderValue},
        Message,
    },
};

/// Writes track descriptors in the layout read by the decoder.
#[derive(Clone, Debug, Default)]
pub struct DescriptorBuilder {
    flags: u8,
    title: Vec<u8>,
    author: Vec<u8>,
    length: u64,
    identifier: Vec<u8>,
    stream: bool,
    uri: Option<Vec<u8>>,
    reserved: Vec<u8>,
}

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn title(self, title: &str) -> Self {
        self.title_bytes(title.as_bytes())
    }

    pub fn title_bytes(mut self, title: &[u8]) -> Self {
        self.title = title.to_vec();
        self
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = author.as_bytes().to_vec();
        self
    }

    pub fn length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }

    pub fn identifier(mut self, identifier: &str) -> Self {
        self.identifier = identifier.as_bytes().to_vec();
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = Some(uri.as_bytes().to_vec());
        self
    }

    pub fn reserved(mut self, reserved: &[u8]) -> Self {
        self.reserved = reserved.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![];

        out.write_u8(self.flags).unwrap();
        out.write_all(&[0; 4]).unwrap();
        write_string(&mut out, &self.title);
        write_string(&mut out, &self.author);
        out.write_u64::<BigEndian>(self.length).unwrap();
        write_string(&mut out, &self.identifier);
        out.write_u8(self.stream as u8).unwrap();

        match &self.uri {
            Some(uri) => {
                out.write_u8(1).unwrap();
                write_string(&mut out, uri);
            },
            None => {
                out.write_u8(0).unwrap();
                out.write_u8(self.reserved.len() as u8).unwrap();
                out.write_all(&self.reserved).unwrap();
            },
        }

        out
    }
}

fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.write_u16::<BigEndian>(bytes.len() as u16).unwrap();
    out.write_all(bytes).unwrap();
}

/// A local WebSocket server standing in for a Lavalink node.
pub struct MockNode {
    addr: SocketAddr,
    accept: JoinHandle<()>,
    conns: Receiver<MockConn>,
}

/// One accepted client connection on a [`MockNode`].
pub struct MockConn {
    /// Headers sent by the client during the handshake.
    pub headers: HeaderMap,
    tx: Sender<Message>,
    rx: Receiver<String>,
}

impl MockNode {
    /// Starts listening on an ephemeral local port, announcing `version` as the
    /// node's major version.
    pub async fn start(version: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let version = HeaderValue::from_str(version).unwrap();
        let (conn_tx, conns) = flume::unbounded();

        let accept = spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_tx = conn_tx.clone();
                let version = version.clone();
                spawn(async move {
                    serve(stream, version, conn_tx).await;
                });
            }
        });

        Self {
            addr,
            accept,
            conns,
        }
    }

    /// WebSocket URL clients should dial.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// REST base URL matching this node.
    pub fn rest_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Waits for the next client to complete its handshake.
    pub async fn next_conn(&self) -> MockConn {
        self.conns.recv_async().await.unwrap()
    }

    /// Stops accepting connections, so that later dials are refused.
    pub async fn shutdown(self) {
        self.accept.abort();
        let _ = self.accept.await;
    }
}

impl MockConn {
    /// Sends a text frame to the client.
    pub fn send(&self, text: &str) {
        self.tx.send(Message::Text(text.into())).unwrap();
    }

    /// Sends a binary frame to the client.
    pub fn send_binary(&self, data: &[u8]) {
        self.tx.send(Message::Binary(data.to_vec())).unwrap();
    }

    /// Receives the next text frame sent by the client.
    pub async fn recv(&self) -> String {
        self.rx.recv_async().await.unwrap()
    }

    /// Closes the connection from the server side.
    pub fn close(self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

async fn serve(stream: TcpStream, version: HeaderValue, conn_tx: Sender<MockConn>) {
    let (header_tx, header_rx) = flume::bounded(1);

    let callback = move |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
        let _ = header_tx.send(req.headers().clone());
        resp.headers_mut().insert("lavalink-major-version", version);
        Ok(resp)
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let headers = header_rx.recv_async().await.unwrap_or_default();

    let (mut sink, mut stream) = ws.split();
    let (out_tx, out_rx) = flume::unbounded::<Message>();
    let (in_tx, in_rx) = flume::unbounded();

    if conn_tx
        .send(MockConn {
            headers,
            tx: out_tx,
            rx: in_rx,
        })
        .is_err()
    {
        return;
    }

    let writer = spawn(async move {
        while let Ok(msg) = out_rx.recv_async().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(Ok(msg)) = stream.next().await {
        if let Message::Text(text) = msg {
            if in_tx.send(text).is_err() {
                break;
            }
        }
    }

    writer.abort();
}

/// A one-shot HTTP server answering a single request with a fixed JSON body.
pub struct MockRest {
    addr: SocketAddr,
    request: JoinHandle<String>,
}

impl MockRest {
    /// Starts listening on an ephemeral local port.
    pub async fn start(status: u16, body: &str) -> Self {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = body.to_string();

        let request = spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut head = vec![];
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {} Mock\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;

            String::from_utf8_lossy(&head).into_owned()
        });

        Self { addr, request }
    }

    /// REST base URL clients should query.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Waits for the request, returning its head (request line and headers).
    pub async fn request(self) -> String {
        self.request.await.unwrap()
    }
}
