#![cfg(feature = "ws")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use ws_lifecycle::transport::NativeError;
use ws_lifecycle::{Config, Connection, ConnectionState, HandlerSet, Kind};

const WAIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Mock WebSocket server.
struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast messages to ALL connected clients
    message_tx: broadcast::Sender<String>,
    /// Drops every live client connection without a close frame
    kill_tx: broadcast::Sender<()>,
    /// Receives text frames sent by clients
    received_rx: mpsc::UnboundedReceiver<String>,
    accepted: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (kill_tx, _) = broadcast::channel::<()>(4);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<String>();
        let accepted = Arc::new(AtomicUsize::new(0));

        let broadcast_tx = message_tx.clone();
        let kill = kill_tx.clone();
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                let received_tx = received_tx.clone();
                let mut msg_rx = broadcast_tx.subscribe();
                let mut kill_rx = kill.subscribe();
                counter.fetch_add(1, Ordering::SeqCst);

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = kill_rx.recv() => break,
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(received_tx.send(text.to_string()));
                                    }
                                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                }
                            }
                            msg = msg_rx.recv() => {
                                match msg {
                                    Ok(text) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            message_tx,
            kill_tx,
            received_rx,
            accepted,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/socket", self.addr)
    }

    /// Send a message to all connected clients.
    fn send(&self, message: &str) {
        drop(self.message_tx.send(message.to_owned()));
    }

    fn kill_all(&self) {
        drop(self.kill_tx.send(()));
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Receive the next text frame sent by a client.
    async fn recv(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

fn config(uri: String) -> Config {
    Config::builder()
        .uri(uri)
        .reconnect_check_interval(POLL_INTERVAL)
        .build()
}

async fn wait_for_state<F>(connection: &Connection, predicate: F)
where
    F: FnMut(&ConnectionState) -> bool,
{
    let mut rx = connection.state_receiver();
    timeout(WAIT, rx.wait_for(predicate))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn messages_round_trip() {
    let mut server = MockWsServer::start().await;
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<Value>();
    let connection = Connection::websocket(
        config(server.ws_url()),
        HandlerSet::new().on_message(move |message| {
            drop(inbound_tx.send(message));
            Ok(())
        }),
    );

    connection.connect().await.unwrap();
    wait_for_state(&connection, |state| state.is_connected).await;
    assert!(!connection.state().is_connecting);

    assert!(connection.send(&json!({"action": "subscribe"})).await.unwrap());
    let received = server.recv().await.unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(&received).unwrap(),
        json!({"action": "subscribe"})
    );

    server.send(r#"{"channel":"prices","seq":1}"#);
    let message = timeout(WAIT, inbound_rx.recv()).await.unwrap().unwrap();
    assert_eq!(message, json!({"channel": "prices", "seq": 1}));

    connection.disconnect();
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let server = MockWsServer::start().await;
    let opens = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opens);
    let connection = Connection::websocket(
        config(server.ws_url()),
        HandlerSet::new().on_open(move |_connection: &Connection| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    connection.connect().await.unwrap();
    wait_for_state(&connection, |state| state.is_connected).await;

    server.kill_all();
    wait_for_state(&connection, |state| !state.is_connected).await;

    timeout(WAIT, async {
        while opens.load(Ordering::SeqCst) < 2 {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    wait_for_state(&connection, |state| state.is_connected).await;

    assert_eq!(server.accepted(), 2);
    assert!(!connection.is_reconnecting());

    connection.disconnect();
}

#[tokio::test]
async fn disconnect_does_not_reconnect() {
    let server = MockWsServer::start().await;
    let connection: Connection = Connection::websocket(config(server.ws_url()), HandlerSet::new());

    connection.connect().await.unwrap();
    wait_for_state(&connection, |state| state.is_connected).await;

    connection.disconnect();
    sleep(POLL_INTERVAL * 5).await;

    assert!(!connection.state().is_connected);
    assert!(!connection.is_reconnecting());
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn refused_connection_reports_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (error_tx, mut error_rx) = mpsc::unbounded_channel::<String>();
    let connection: Connection = Connection::websocket(
        Config::builder()
            .uri(format!("ws://{addr}/socket"))
            .auto_reconnect(false)
            .build(),
        HandlerSet::new().on_error(move |error: &NativeError| {
            drop(error_tx.send(error.message.clone()));
        }),
    );

    connection.connect().await.unwrap();

    let message = timeout(WAIT, error_rx.recv()).await.unwrap().unwrap();
    assert!(!message.is_empty());
    assert!(!connection.state().is_connected);
    assert!(!connection.state().is_connecting);
}

#[tokio::test]
async fn invalid_uri_fails_to_connect() {
    let connection: Connection = Connection::websocket(Config::new("not a uri"), HandlerSet::new());

    let error = connection.connect().await.unwrap_err();

    assert_eq!(error.kind(), Kind::Connection);
    assert!(connection.handle_id().is_none());
    connection.disconnect();
}
