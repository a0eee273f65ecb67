#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use assistant_link::assistant::{Client, Endpoint, Reply};
use assistant_link::ws::config::Config;
use assistant_link::ws::{ConnectionState, Delivery};
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// How the mock server treats each accepted connection.
#[derive(Clone, Copy)]
enum Mode {
    /// Keep the connection open and relay frames
    Serve,
    /// Complete the handshake, then close straight away
    CloseImmediately,
}

/// A frame the mock server received from a client.
#[derive(Debug, PartialEq)]
enum Received {
    Text(String),
    Binary(Vec<u8>),
}

/// Mock assistant backend.
struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast messages to ALL connected clients
    message_tx: broadcast::Sender<Message>,
    /// Frames received from clients
    received_rx: mpsc::UnboundedReceiver<Received>,
    /// Request URI and accept time of every completed handshake
    accepted_rx: mpsc::UnboundedReceiver<(String, Instant)>,
    /// Signalled when a client connection ends
    closed_rx: mpsc::UnboundedReceiver<()>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<Message>(100);
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();

        let broadcast_tx = message_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let mut uri = String::new();
                let handshake = tokio_tungstenite::accept_hdr_async(
                    stream,
                    |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                        uri = request.uri().to_string();
                        Ok(response)
                    },
                )
                .await;
                let Ok(ws_stream) = handshake else {
                    continue;
                };
                drop(accepted_tx.send((uri, Instant::now())));

                let (mut write, mut read) = ws_stream.split();
                let received_tx = received_tx.clone();
                let closed_tx = closed_tx.clone();
                let mut msg_rx = broadcast_tx.subscribe();

                tokio::spawn(async move {
                    if matches!(mode, Mode::CloseImmediately) {
                        drop(write.send(Message::Close(None)).await);
                        // Drain until the client acknowledges the close
                        while let Some(Ok(_)) = read.next().await {}
                        drop(closed_tx.send(()));
                        return;
                    }

                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(received_tx.send(Received::Text(text.to_string())));
                                    }
                                    Some(Ok(Message::Binary(bytes))) => {
                                        drop(received_tx.send(Received::Binary(bytes.to_vec())));
                                    }
                                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                    Some(Ok(_)) => {}
                                }
                            }
                            msg = msg_rx.recv() => {
                                match msg {
                                    Ok(message) => {
                                        if write.send(message).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                        }
                    }
                    drop(closed_tx.send(()));
                });
            }
        });

        Self {
            addr,
            message_tx,
            received_rx,
            accepted_rx,
            closed_rx,
        }
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Send a text frame to all connected clients.
    fn send(&self, message: &str) {
        drop(self.message_tx.send(Message::Text(message.into())));
    }

    /// Receive the next frame a client sent.
    async fn recv(&mut self) -> Option<Received> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for the next completed handshake.
    async fn accepted(&mut self) -> Option<(String, Instant)> {
        timeout(Duration::from_secs(10), self.accepted_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for a client connection to end.
    async fn closed(&mut self) -> Option<()> {
        timeout(Duration::from_secs(2), self.closed_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

fn client(server: &MockWsServer) -> Client {
    let endpoint = Endpoint::new(&server.ws_url("/ws/device"), "english").unwrap();
    Client::new(endpoint, Config::default()).unwrap()
}

async fn wait_connected(client: &Client) {
    let mut status = client.status_receiver();
    timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.state.is_connected()),
    )
    .await
    .unwrap()
    .unwrap();
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn connects_with_language_query() {
        let mut server = MockWsServer::start(Mode::Serve).await;
        let client = client(&server);

        let (uri, _) = server.accepted().await.unwrap();
        wait_connected(&client).await;

        assert_eq!(uri, "/ws/device?language=english");
        assert!(client.connection_state().is_connected());
    }

    #[tokio::test]
    async fn reconnects_three_seconds_after_server_close() {
        let mut server = MockWsServer::start(Mode::CloseImmediately).await;
        let _client = client(&server);

        let (_, first) = server.accepted().await.unwrap();
        let (_, second) = server.accepted().await.unwrap();
        let (_, third) = server.accepted().await.unwrap();

        for gap in [second - first, third - second] {
            assert!(gap >= Duration::from_millis(3000), "reconnected after {gap:?}");
            assert!(gap < Duration::from_millis(3500), "reconnected after {gap:?}");
        }
    }

    #[tokio::test]
    async fn unreachable_backend_keeps_retrying_without_failing() {
        // Bind then drop to obtain a port nothing listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let endpoint = Endpoint::new(&format!("ws://{addr}/ws/device"), "english").unwrap();
        let client = Client::new(endpoint, Config::default()).unwrap();

        let mut status = client.status_receiver();
        let status = timeout(Duration::from_secs(2), status.wait_for(|s| s.retries >= 1))
            .await
            .unwrap()
            .unwrap()
            .clone();

        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(status.last_error.is_some());
        assert_eq!(client.send_text("hello").unwrap(), Delivery::Dropped);
    }

    #[tokio::test]
    async fn dispose_closes_socket_and_stops_reconnecting() {
        let mut server = MockWsServer::start(Mode::Serve).await;
        let client = client(&server);
        server.accepted().await.unwrap();
        wait_connected(&client).await;

        client.dispose();
        client.dispose();
        timeout(Duration::from_secs(2), client.closed()).await.unwrap();

        assert!(server.closed().await.is_some());
        assert_eq!(client.connection_state(), ConnectionState::Terminal);
        // No reconnection after the retry delay has passed
        assert!(
            timeout(Duration::from_millis(3500), server.accepted_rx.recv())
                .await
                .is_err()
        );
    }
}

mod messaging {
    use super::*;

    #[tokio::test]
    async fn send_text_uses_transcript_envelope_every_time() {
        let mut server = MockWsServer::start(Mode::Serve).await;
        let client = client(&server);
        wait_connected(&client).await;

        assert_eq!(client.send_text("hello").unwrap(), Delivery::Queued);
        assert_eq!(client.send_text("hello").unwrap(), Delivery::Queued);

        for _ in 0..2 {
            let Some(Received::Text(text)) = server.recv().await else {
                panic!("expected a text frame");
            };
            assert_eq!(text, r#"{"transcibed_text":"hello"}"#);
            let value: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value, json!({"transcibed_text": "hello"}));
        }
    }

    #[tokio::test]
    async fn send_audio_sends_raw_bytes() {
        let mut server = MockWsServer::start(Mode::Serve).await;
        let client = client(&server);
        wait_connected(&client).await;

        assert_eq!(client.send_audio(vec![0_u8, 127, 255]), Delivery::Queued);

        assert_eq!(
            server.recv().await,
            Some(Received::Binary(vec![0, 127, 255]))
        );
    }

    #[tokio::test]
    async fn final_event_is_delivered_unchanged() {
        let server = MockWsServer::start(Mode::Serve).await;
        let client = client(&server);
        let mut events = Box::pin(client.events());
        let mut replies = Box::pin(client.replies());
        wait_connected(&client).await;

        let payload = json!({
            "is_transcription": false,
            "is_text": true,
            "is_end": true,
            "msg": "Hello!"
        });
        server.send(&payload.to_string());

        let event = timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(serde_json::to_value(&event).unwrap(), payload);

        let reply = timeout(Duration::from_secs(2), replies.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reply, Reply::Final("Hello!".to_owned()));
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_and_next_frame_delivered() {
        let server = MockWsServer::start(Mode::Serve).await;
        let client = client(&server);
        let mut events = Box::pin(client.events());
        wait_connected(&client).await;

        server.send("{not json");
        server.send(r#"{"is_transcription": false, "is_text": true, "msg": "still here"}"#);

        let first = timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .unwrap();
        assert!(first.is_err());

        let second = timeout(Duration::from_secs(2), events.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.reply(), Reply::Partial("still here".to_owned()));
        assert!(client.connection_state().is_connected());
    }
}
