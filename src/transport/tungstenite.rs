use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Connector, EventSlots, NativeError, NativeEvent, TransportError, TransportHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections with `tokio-tungstenite`.
///
/// Each handle is driven by its own task on the current tokio runtime. Only
/// text frames are surfaced; binary and control frames are ignored.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct WsConnector {
    /// Upper bound for the opening handshake before an error event is emitted
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    pub connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Connector for WsConnector {
    fn open(
        &self,
        uri: &str,
        slots: Arc<EventSlots>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        let url = Url::parse(uri)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_owned()));
        }

        let runtime = Handle::try_current().map_err(|_e| TransportError::RuntimeUnavailable)?;

        let (sender_tx, sender_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        runtime.spawn(run(
            url,
            self.connect_timeout,
            sender_rx,
            token.clone(),
            slots,
        ));

        Ok(Arc::new(WsHandle { sender_tx, token }))
    }
}

/// Handle to one socket task.
#[derive(Debug)]
struct WsHandle {
    sender_tx: mpsc::UnboundedSender<String>,
    token: CancellationToken,
}

impl TransportHandle for WsHandle {
    fn send(&self, text: String) -> Result<bool, TransportError> {
        Ok(!self.token.is_cancelled() && self.sender_tx.send(text).is_ok())
    }

    fn close(&self) {
        self.token.cancel();
    }
}

fn emit(slots: &EventSlots, event: &NativeEvent) {
    if let Err(e) = slots.emit(event) {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %e, "Failed to handle WebSocket event");
        #[cfg(not(feature = "tracing"))]
        let _ = &e;
    }
}

fn error_event(error: &TransportError) -> NativeEvent {
    NativeEvent::Error(NativeError {
        message: error.to_string(),
        is_trusted: Some(false),
    })
}

/// Connect, report the outcome, then pump frames until closed.
async fn run(
    url: Url,
    connect_timeout: Duration,
    mut sender_rx: mpsc::UnboundedReceiver<String>,
    token: CancellationToken,
    slots: Arc<EventSlots>,
) {
    let connected = tokio::select! {
        () = token.cancelled() => return,
        result = timeout(connect_timeout, connect_async(url.as_str())) => result,
    };

    let ws_stream = match connected {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            emit(&slots, &error_event(&TransportError::Connection(e)));
            return;
        }
        Err(_elapsed) => {
            emit(&slots, &error_event(&TransportError::Timeout));
            return;
        }
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(%url, "WebSocket connected");

    emit(&slots, &NativeEvent::Open);

    if let Some(event) = pump(ws_stream, &mut sender_rx, &token, &slots).await {
        emit(&slots, &event);
    }
}

/// Forward frames in both directions. Returns the terminal event to report,
/// or `None` when the handle was closed locally.
async fn pump(
    ws_stream: WsStream,
    sender_rx: &mut mpsc::UnboundedReceiver<String>,
    token: &CancellationToken,
    slots: &EventSlots,
) -> Option<NativeEvent> {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            () = token.cancelled() => {
                // Best effort: the peer may already be gone.
                _ = write.send(Message::Close(None)).await;
                return None;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(%text, "Received WebSocket text message");

                        emit(slots, &NativeEvent::message(text.as_str()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Some(NativeEvent::Close {
                            code: frame.as_ref().map(|frame| u16::from(frame.code)),
                            reason: frame.map(|frame| frame.reason.as_str().to_owned()),
                        });
                    }
                    Some(Err(e)) => {
                        return Some(error_event(&TransportError::Connection(e)));
                    }
                    None => return Some(NativeEvent::closed()),
                    Some(Ok(_)) => {
                        // Binary frames are not supported; control frames are answered by tungstenite.
                    }
                }
            }

            Some(text) = sender_rx.recv() => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    return Some(error_event(&TransportError::Connection(e)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_uri() {
        let result = WsConnector::default().open("not a uri", Arc::new(EventSlots::new()));

        assert!(matches!(result, Err(TransportError::InvalidUri(_))));
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let result =
            WsConnector::default().open("http://localhost:9001", Arc::new(EventSlots::new()));

        assert!(matches!(result, Err(TransportError::UnsupportedScheme(scheme)) if scheme == "http"));
    }

    #[test]
    fn requires_tokio_runtime() {
        let result =
            WsConnector::default().open("ws://localhost:9001", Arc::new(EventSlots::new()));

        assert!(matches!(result, Err(TransportError::RuntimeUnavailable)));
    }

    #[test]
    fn default_connect_timeout_is_ten_seconds() {
        assert_eq!(WsConnector::default().connect_timeout, Duration::from_secs(10));
    }
}
