//! Transport seam: the primitives a socket implementation provides.
//!
//! A [`Connector`] opens a [`TransportHandle`] for a URI and reports native
//! events through the four [`EventSlots`] it was given. The connection
//! controller owns the slots and unbinds them before discarding a handle, so
//! events from a torn-down socket never reach user code.
//!
//! With the `ws` feature enabled, [`tungstenite::WsConnector`] provides an
//! implementation on top of `tokio-tungstenite`.

#![expect(
    clippy::module_name_repetitions,
    reason = "Transport types carry the module name to distinguish them from connection types"
)]

#[cfg(feature = "ws")]
pub mod tungstenite;

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::Result;
use crate::error::{Error, Kind};

/// The four native event slots of a transport handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[expect(
    clippy::exhaustive_enums,
    reason = "The slot set is closed; matching it exhaustively is the point"
)]
pub enum Slot {
    Open,
    Message,
    Close,
    Error,
}

impl Slot {
    pub const ALL: [Self; 4] = [Self::Open, Self::Message, Self::Close, Self::Error];
}

/// Error reported by the transport through the error slot.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub message: String,
    pub is_trusted: Option<bool>,
}

impl NativeError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            is_trusted: None,
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for NativeError {}

/// Event emitted by a transport handle.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    Open,
    Message {
        data: Option<String>,
    },
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
    Error(NativeError),
}

impl NativeEvent {
    #[must_use]
    pub fn message<S: Into<String>>(data: S) -> Self {
        Self::Message {
            data: Some(data.into()),
        }
    }

    #[must_use]
    pub const fn closed() -> Self {
        Self::Close {
            code: None,
            reason: None,
        }
    }

    /// The slot this event is delivered to.
    #[must_use]
    pub const fn slot(&self) -> Slot {
        match self {
            Self::Open => Slot::Open,
            Self::Message { .. } => Slot::Message,
            Self::Close { .. } => Slot::Close,
            Self::Error(_) => Slot::Error,
        }
    }
}

/// Callback bound to an event slot.
pub type NativeHandler = Arc<dyn Fn(&NativeEvent) -> Result<()> + Send + Sync>;

/// The assignable event slots of one transport handle.
#[derive(Default)]
pub struct EventSlots {
    open: RwLock<Option<NativeHandler>>,
    message: RwLock<Option<NativeHandler>>,
    close: RwLock<Option<NativeHandler>>,
    error: RwLock<Option<NativeHandler>>,
}

impl fmt::Debug for EventSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSlots")
            .field("open", &self.is_bound(Slot::Open))
            .field("message", &self.is_bound(Slot::Message))
            .field("close", &self.is_bound(Slot::Close))
            .field("error", &self.is_bound(Slot::Error))
            .finish()
    }
}

impl EventSlots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, slot: Slot) -> &RwLock<Option<NativeHandler>> {
        match slot {
            Slot::Open => &self.open,
            Slot::Message => &self.message,
            Slot::Close => &self.close,
            Slot::Error => &self.error,
        }
    }

    pub fn bind(&self, slot: Slot, handler: NativeHandler) {
        // A slot holds no invariant beyond its own value, so poisoning is recoverable.
        *self
            .cell(slot)
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn unbind(&self, slot: Slot) {
        self.cell(slot)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn unbind_all(&self) {
        for slot in Slot::ALL {
            self.unbind(slot);
        }
    }

    #[must_use]
    pub fn is_bound(&self, slot: Slot) -> bool {
        self.cell(slot)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Deliver `event` to its slot.
    ///
    /// An unbound slot swallows the event. The handler runs after the slot
    /// lock is released, so it may rebind or unbind slots itself.
    pub fn emit(&self, event: &NativeEvent) -> Result<()> {
        let handler = self
            .cell(event.slot())
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => handler(event),
            None => Ok(()),
        }
    }
}

/// A live socket.
pub trait TransportHandle: Send + Sync {
    /// Queue `text` for delivery. Returns whether the transport accepted it.
    fn send(&self, text: String) -> std::result::Result<bool, TransportError>;

    /// Close the socket. Must not emit events synchronously.
    fn close(&self);
}

/// Factory for transport handles.
pub trait Connector: Send + Sync + 'static {
    /// Open a socket to `uri` that reports its events through `slots`.
    ///
    /// Implementations must not emit events from within this call: the caller
    /// holds the connection's handle lock until it returns.
    fn open(
        &self,
        uri: &str,
        slots: Arc<EventSlots>,
    ) -> std::result::Result<Arc<dyn TransportHandle>, TransportError>;
}

/// Transport-level failures.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportError {
    /// Error connecting to or communicating with the WebSocket server
    #[cfg(feature = "ws")]
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The URI could not be parsed
    InvalidUri(url::ParseError),
    /// The URI scheme is not supported by this transport
    UnsupportedScheme(String),
    /// No async runtime is available to drive the socket
    RuntimeUnavailable,
    /// The socket is already closed
    ConnectionClosed,
    /// Operation timed out
    Timeout,
    /// Failure reported by a custom transport
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "ws")]
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::InvalidUri(e) => write!(f, "invalid URI: {e}"),
            Self::UnsupportedScheme(scheme) => write!(f, "unsupported URI scheme: {scheme}"),
            Self::RuntimeUnavailable => write!(f, "no tokio runtime available"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::Other(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(feature = "ws")]
            Self::Connection(e) => Some(e),
            Self::InvalidUri(e) => Some(e),
            _ => None,
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUri(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::with_source(Kind::Connection, "transport failure", e)
    }
}
