#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::Result;
use crate::codec::encode_message;
use crate::config::Config;
use crate::error::{Error, Kind};
use crate::handler::{DecoratedHandlers, HandlerSet, decorate_all};
use crate::reconnect::{ReconnectPolicy, Supervisor};
use crate::state::{Action, ConnectionState, RawAction, StateStore};
use crate::transport::{Connector, EventSlots, NativeEvent, Slot, TransportHandle};

/// Coarse lifecycle of a [`Connection`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// `connect` has never been called
    #[default]
    Idle,
    /// A handle exists but has not reported open yet
    Connecting,
    /// The transport reported open
    Open,
    /// The transport closed or errored, or the connection was torn down
    Closed,
}

/// The single live transport handle together with its event slots.
struct LiveHandle {
    id: u64,
    handle: Arc<dyn TransportHandle>,
    slots: Arc<EventSlots>,
}

impl LiveHandle {
    /// Unbind before closing so that an intentional close reports nothing.
    fn teardown(self) {
        self.slots.unbind_all();
        self.handle.close();
    }
}

#[derive(Default)]
struct HandleCell {
    live: Option<LiveHandle>,
    generation: u64,
    phase: Phase,
}

pub(crate) struct Inner<M> {
    uri: String,
    connector: Box<dyn Connector>,
    store: StateStore,
    supervisor: Supervisor,
    decorated: DecoratedHandlers,
    cell: Mutex<HandleCell>,
    _message: PhantomData<fn() -> M>,
}

impl<M> Drop for Inner<M> {
    fn drop(&mut self) {
        let cell = self.cell.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(live) = cell.live.take() {
            live.teardown();
        }
    }
}

/// Manages one persistent connection: connecting, sending, tracking state and
/// reconnecting after unexpected closes.
///
/// `M` is the type inbound messages are decoded into.
///
/// # Example
///
/// ```ignore
/// let connection = Connection::websocket(
///     Config::new("wss://example.com/socket"),
///     HandlerSet::new().on_message(|message: serde_json::Value| {
///         println!("received {message}");
///         Ok(())
///     }),
/// );
///
/// connection.connect().await?;
/// connection.send(&json!({"action": "subscribe"})).await?;
/// ```
pub struct Connection<M = Value> {
    inner: Arc<Inner<M>>,
}

impl<M> Clone for Connection<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> fmt::Debug for Connection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("uri", &self.inner.uri)
            .field("state", &self.inner.store.current())
            .field("supervisor", &self.inner.supervisor)
            .finish_non_exhaustive()
    }
}

/// Non-owning reference to a [`Connection`], held by decorated handlers and
/// the reconnection poller.
pub struct ControllerRef<M = Value> {
    inner: Weak<Inner<M>>,
}

impl<M> Clone for ControllerRef<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<M> fmt::Debug for ControllerRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRef")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<M> ControllerRef<M> {
    #[must_use]
    pub fn upgrade(&self) -> Option<Connection<M>> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

impl<M> Connection<M>
where
    M: DeserializeOwned + Send + 'static,
{
    /// Create a connection over `connector`. Nothing is opened until
    /// [`Connection::connect`] is called.
    ///
    /// Without an `on_message` callback, inbound messages are decoded and dropped.
    pub fn new<C: Connector>(config: Config, handlers: HandlerSet<M>, connector: C) -> Self {
        let handlers = if handlers.has_message_handler() {
            handlers
        } else {
            handlers.on_message(|_message| Ok(()))
        };
        let policy = config.reconnect_policy();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<M>>| {
            let controller = ControllerRef {
                inner: Weak::clone(weak),
            };
            let poller = controller.clone();

            Inner {
                uri: config.uri,
                connector: Box::new(connector),
                store: StateStore::default(),
                supervisor: Supervisor::new(policy, move || {
                    if let Some(connection) = poller.upgrade() {
                        connection.poll_tick();
                    }
                }),
                decorated: decorate_all(&handlers, &controller),
                cell: Mutex::new(HandleCell::default()),
                _message: PhantomData,
            }
        });

        Self { inner }
    }

    /// Create a connection over [`WsConnector`](crate::transport::tungstenite::WsConnector)
    /// with its default settings.
    #[cfg(feature = "ws")]
    pub fn websocket(config: Config, handlers: HandlerSet<M>) -> Self {
        Self::new(
            config,
            handlers,
            crate::transport::tungstenite::WsConnector::default(),
        )
    }

    /// Open a new transport handle, replacing any previous one.
    ///
    /// Resolves to `true` once the handlers are bound to the new handle. The
    /// connection is only reported as connected after the transport emits
    /// its open event; replacing an open handle clears `is_connected`.
    #[expect(
        clippy::unused_async,
        reason = "Binding completes synchronously; callers still await completion"
    )]
    pub async fn connect(&self) -> Result<bool> {
        self.connect_now()
    }

    fn connect_now(&self) -> Result<bool> {
        let mut cell = self.lock_cell();

        #[cfg(feature = "tracing")]
        tracing::debug!(uri = %self.inner.uri, "connecting");

        self.inner.store.dispatch(Action::SetConnecting(true));
        cell.phase = Phase::Connecting;

        // The replaced handle reports nothing once unbound, so its open state is cleared here.
        if let Some(previous) = cell.live.take() {
            previous.teardown();
            self.inner.store.dispatch(Action::SetConnected(false));
        }

        cell.generation += 1;
        let generation = cell.generation;
        let slots = Arc::new(EventSlots::new());
        self.bind_current(&slots, generation);

        match self.inner.connector.open(&self.inner.uri, Arc::clone(&slots)) {
            Ok(handle) => {
                cell.live = Some(LiveHandle {
                    id: generation,
                    handle,
                    slots,
                });
                Ok(true)
            }
            Err(e) => {
                slots.unbind_all();
                cell.phase = Phase::Closed;
                drop(cell);

                self.inner.store.dispatch(Action::SetConnecting(false));
                self.inner.supervisor.on_close();
                Err(Error::with_source(
                    Kind::Connection,
                    "unexpected connect error",
                    e,
                ))
            }
        }
    }

    /// Bind the decorated handlers, ignoring events once `generation` is stale.
    fn bind_current(&self, slots: &EventSlots, generation: u64) {
        for slot in Slot::ALL {
            let handler = Arc::clone(self.inner.decorated.get(slot));
            let controller = self.downgrade();

            slots.bind(
                slot,
                Arc::new(move |event: &NativeEvent| {
                    let is_current = controller
                        .upgrade()
                        .is_some_and(|connection| connection.generation() == generation);

                    if is_current { handler(event) } else { Ok(()) }
                }),
            );
        }
    }

    fn poll_tick(&self) {
        let state = self.inner.store.current();
        if !self.inner.supervisor.policy().should_attempt(state, true) {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(uri = %self.inner.uri, "attempting reconnection");

        if let Err(e) = self.connect_now() {
            #[cfg(feature = "tracing")]
            tracing::error!("Reconnection attempt failed: {e:?}");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    /// Encode `payload` as JSON and hand it to the live transport handle.
    ///
    /// Returns whether the transport accepted the message.
    #[expect(
        clippy::unused_async,
        reason = "Sending only enqueues; callers still await completion"
    )]
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<bool> {
        let handle = self
            .lock_cell()
            .live
            .as_ref()
            .map(|live| Arc::clone(&live.handle));
        let Some(handle) = handle else {
            return Err(Error::connection("client is not ready"));
        };

        let text = encode_message(payload)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%text, "sending message");

        handle
            .send(text)
            .map_err(|e| Error::with_source(Kind::Connection, "could not send message", e))
    }

    /// Close and discard the live handle and stop reconnection polling.
    ///
    /// Safe to call repeatedly and before any connect.
    pub fn disconnect(&self) {
        self.inner.supervisor.stop();

        let previous = {
            let mut cell = self.lock_cell();
            cell.generation += 1;
            if cell.phase != Phase::Idle {
                cell.phase = Phase::Closed;
            }
            cell.live.take()
        };

        if let Some(previous) = previous {
            #[cfg(feature = "tracing")]
            tracing::debug!(uri = %self.inner.uri, handle = previous.id, "disconnecting");

            previous.teardown();
            self.inner.store.dispatch(Action::SetConnected(false));
            self.inner.store.dispatch(Action::SetConnecting(false));
        }
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.inner.supervisor.policy()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.store.current()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.store.subscribe()
    }

    /// Apply a state transition from outside the handlers.
    pub fn dispatch(&self, action: Action) -> ConnectionState {
        self.inner.store.dispatch(action)
    }

    /// Apply an untyped `{type, payload}` state update.
    ///
    /// # Panics
    ///
    /// Panics when the action type is unknown.
    pub fn dispatch_raw(&self, action: &RawAction) -> ConnectionState {
        self.inner.store.dispatch_raw(action)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock_cell().phase
    }

    /// Whether the reconnection poller is currently running.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.inner.supervisor.is_running()
    }

    /// Identity of the live transport handle, if any. Each `connect` yields a new one.
    #[must_use]
    pub fn handle_id(&self) -> Option<u64> {
        self.lock_cell().live.as_ref().map(|live| live.id)
    }

    #[must_use]
    pub fn downgrade(&self) -> ControllerRef<M> {
        ControllerRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn supervisor(&self) -> &Supervisor {
        &self.inner.supervisor
    }

    pub(crate) fn mark_open(&self) {
        self.inner.store.dispatch(Action::SetConnected(true));
        self.inner.store.dispatch(Action::SetConnecting(false));
        self.lock_cell().phase = Phase::Open;
    }

    pub(crate) fn mark_closed(&self) {
        self.inner.store.dispatch(Action::SetConnected(false));
        self.inner.store.dispatch(Action::SetConnecting(false));
        self.lock_cell().phase = Phase::Closed;
    }

    fn generation(&self) -> u64 {
        self.lock_cell().generation
    }

    fn lock_cell(&self) -> MutexGuard<'_, HandleCell> {
        // Every write to the cell leaves it consistent, so a poisoned lock is still usable.
        self.inner
            .cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
