//! Demonstrates a managed WebSocket connection against an echo server.
//!
//! This example shows how to:
//! 1. Register lifecycle and message callbacks
//! 2. Connect and wait for the connection to report open
//! 3. Send JSON messages and receive the echoes
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,ws_lifecycle=debug cargo run --example echo --features ws,tracing
//! ```
//!
//! Point it at another server with `ECHO_URI`:
//! ```sh
//! ECHO_URI=ws://127.0.0.1:9001 cargo run --example echo --features ws,tracing
//! ```

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};
use ws_lifecycle::transport::NativeError;
use ws_lifecycle::{Config, Connection, HandlerSet};

const DEFAULT_URI: &str = "wss://echo.websocket.org";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let uri = std::env::var("ECHO_URI").unwrap_or_else(|_| DEFAULT_URI.to_owned());
    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel::<Value>();

    let handlers = HandlerSet::new()
        .on_open(|connection: &Connection| info!(uri = connection.uri(), "socket opened"))
        .on_close(|| info!("socket closed"))
        .on_error(|error: &NativeError| warn!(error = %error, "socket error"))
        .on_message(move |message| {
            echo_tx.send(message)?;
            Ok(())
        });

    let config = Config::builder()
        .uri(uri)
        .reconnect_check_interval(Duration::from_secs(2))
        .build();
    let connection = Connection::websocket(config, handlers);

    connection.connect().await?;
    timeout(
        Duration::from_secs(10),
        connection.state_receiver().wait_for(|state| state.is_connected),
    )
    .await??;

    for seq in 1..=3 {
        let sent = connection
            .send(&json!({"action": "echo", "seq": seq}))
            .await?;
        info!(seq, sent, "message sent");

        // Echo servers may greet with a non-JSON banner; those surface as decode errors in the logs.
        match timeout(Duration::from_secs(5), echo_rx.recv()).await {
            Ok(Some(echo)) => info!(%echo, "echo received"),
            Ok(None) => break,
            Err(_) => warn!(seq, "no echo within 5s"),
        }
    }

    info!(state = ?connection.state(), "disconnecting");
    connection.disconnect();

    Ok(())
}
