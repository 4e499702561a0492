//! User callbacks and the decorator that wraps them with state tracking.
//!
//! Each user callback is wrapped into a [`NativeHandler`] for its [`Slot`].
//! The wrappers perform the connection-state transitions and reconnection
//! bookkeeping around the user's own logic, whatever that logic does:
//!
//! - open: stop polling, run the user callback, then mark the connection open
//! - close: mark the connection closed, start polling, then run the user callback
//! - error: the close sequence, then the user's error callback
//! - message: decode and dispatch through [`codec::dispatch_message`]
//!
//! A panicking user callback does not skip the state transitions; the panic is
//! returned as a [`Kind::Connection`] error once they have been applied.

#![expect(
    clippy::module_name_repetitions,
    reason = "Handler types carry the module name for clarity at call sites"
)]

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Result;
use crate::codec;
use crate::connection::{Connection, ControllerRef};
use crate::error::{BoxError, Error, HandlerPanicked, Kind};
use crate::transport::{EventSlots, NativeError, NativeEvent, NativeHandler, Slot};

pub type HandlerResult = std::result::Result<(), BoxError>;

const CALLBACK_PANICKED: &str = "user callback panicked";

pub type OnOpen<M> = Arc<dyn Fn(&Connection<M>) + Send + Sync>;
pub type OnClose = Arc<dyn Fn() + Send + Sync>;
pub type OnError = Arc<dyn Fn(&NativeError) + Send + Sync>;
pub type OnMessage<M> = Arc<dyn Fn(M) -> HandlerResult + Send + Sync>;

/// The optional callbacks supplied by the consumer.
///
/// ```
/// use ws_lifecycle::HandlerSet;
///
/// let handlers = HandlerSet::<serde_json::Value>::new()
///     .on_message(|message| {
///         assert!(message.is_object());
///         Ok(())
///     })
///     .on_close(|| {});
/// ```
pub struct HandlerSet<M = Value> {
    on_open: Option<OnOpen<M>>,
    on_close: Option<OnClose>,
    on_error: Option<OnError>,
    on_message: Option<OnMessage<M>>,
}

impl<M> Default for HandlerSet<M> {
    fn default() -> Self {
        Self {
            on_open: None,
            on_close: None,
            on_error: None,
            on_message: None,
        }
    }
}

impl<M> Clone for HandlerSet<M> {
    fn clone(&self) -> Self {
        Self {
            on_open: self.on_open.clone(),
            on_close: self.on_close.clone(),
            on_error: self.on_error.clone(),
            on_message: self.on_message.clone(),
        }
    }
}

impl<M> fmt::Debug for HandlerSet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

impl<M> HandlerSet<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection<M>) + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Called for transport errors, and for failures of the message path
    /// (decode errors, `on_message` errors and panics). Only transport errors
    /// close the connection.
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&NativeError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(M) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn has_message_handler(&self) -> bool {
        self.on_message.is_some()
    }

    /// The user callback registered for `slot`, tagged with its slot.
    #[must_use]
    pub fn handler(&self, slot: Slot) -> UserHandler<M> {
        match slot {
            Slot::Open => UserHandler::Open(self.on_open.clone()),
            Slot::Message => UserHandler::Message(self.on_message.clone()),
            Slot::Close => UserHandler::Close(self.on_close.clone()),
            Slot::Error => UserHandler::Error(self.on_error.clone()),
        }
    }
}

/// A user callback (or its absence) for one slot.
#[non_exhaustive]
pub enum UserHandler<M = Value> {
    Open(Option<OnOpen<M>>),
    Close(Option<OnClose>),
    Error(Option<OnError>),
    Message(Option<OnMessage<M>>),
}

impl<M> UserHandler<M> {
    #[must_use]
    pub const fn slot(&self) -> Slot {
        match self {
            Self::Open(_) => Slot::Open,
            Self::Close(_) => Slot::Close,
            Self::Error(_) => Slot::Error,
            Self::Message(_) => Slot::Message,
        }
    }
}

/// Wrap `handler` with the side effects of its slot.
///
/// The returned closure holds only a weak reference to the controller; once
/// the controller is gone, lifecycle events become no-ops.
pub fn decorate<M>(handler: UserHandler<M>, controller: ControllerRef<M>) -> NativeHandler
where
    M: DeserializeOwned + Send + 'static,
{
    match handler {
        UserHandler::Open(user) => Arc::new(move |_event: &NativeEvent| {
            let Some(connection) = controller.upgrade() else {
                return Ok(());
            };

            connection.supervisor().on_open();
            let outcome = user
                .as_ref()
                .map_or(Ok(()), |user| guarded(Slot::Open, || user(&connection)));
            connection.mark_open();
            outcome
        }),
        UserHandler::Close(user) => Arc::new(move |_event: &NativeEvent| {
            let Some(connection) = controller.upgrade() else {
                return Ok(());
            };

            connection.mark_closed();
            connection.supervisor().on_close();
            user.as_ref()
                .map_or(Ok(()), |user| guarded(Slot::Close, || user()))
        }),
        UserHandler::Error(user) => Arc::new(move |event: &NativeEvent| {
            let Some(connection) = controller.upgrade() else {
                return Ok(());
            };

            // Sockets do not reliably emit both events, so an error is also a close.
            connection.mark_closed();
            connection.supervisor().on_close();

            #[cfg(feature = "tracing")]
            tracing::warn!(?event, "connection error");

            match (&user, event) {
                (Some(user), NativeEvent::Error(error)) => guarded(Slot::Error, || user(error)),
                _ => Ok(()),
            }
        }),
        UserHandler::Message(user) => Arc::new(move |event: &NativeEvent| {
            let NativeEvent::Message { data } = event else {
                return Ok(());
            };

            #[cfg(feature = "tracing")]
            tracing::trace!(?data, "received message");

            codec::dispatch_message(data.as_deref(), user.as_ref())
        }),
    }
}

/// Run a user lifecycle callback, turning a panic into a [`Kind::Connection`] error.
///
/// Callers apply their state transitions regardless of the outcome.
fn guarded<F: FnOnce()>(slot: Slot, callback: F) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(callback)).map_err(|payload| {
        let error = Error::with_source(
            Kind::Connection,
            CALLBACK_PANICKED,
            HandlerPanicked {
                message: codec::panic_message(payload.as_ref()),
            },
        );

        #[cfg(feature = "tracing")]
        tracing::error!(?slot, %error, "user callback panicked");
        #[cfg(not(feature = "tracing"))]
        let _ = &slot;

        error
    })
}

/// Also hand message-path failures to the user's error callback.
///
/// Unlike transport errors, these neither close the connection nor start polling.
fn report_failures(handler: NativeHandler, on_error: Option<OnError>) -> NativeHandler {
    let Some(on_error) = on_error else {
        return handler;
    };

    Arc::new(move |event: &NativeEvent| {
        let result = handler(event);
        if let Err(e) = &result {
            let failure = NativeError::new(e.to_string());
            if let Err(panicked) = guarded(Slot::Error, || on_error(&failure)) {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %panicked, "error callback failed while reporting a message failure");
                #[cfg(not(feature = "tracing"))]
                let _ = &panicked;
            }
        }
        result
    })
}

/// The decorated native handlers for all four slots.
#[derive(Clone)]
pub struct DecoratedHandlers {
    open: NativeHandler,
    message: NativeHandler,
    close: NativeHandler,
    error: NativeHandler,
}

impl fmt::Debug for DecoratedHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratedHandlers").finish_non_exhaustive()
    }
}

impl DecoratedHandlers {
    #[must_use]
    pub fn get(&self, slot: Slot) -> &NativeHandler {
        match slot {
            Slot::Open => &self.open,
            Slot::Message => &self.message,
            Slot::Close => &self.close,
            Slot::Error => &self.error,
        }
    }

    /// Bind every handler to its slot on `slots`.
    pub fn bind(&self, slots: &EventSlots) {
        for slot in Slot::ALL {
            slots.bind(slot, Arc::clone(self.get(slot)));
        }
    }
}

/// Decorate every callback in `handlers`.
pub fn decorate_all<M>(handlers: &HandlerSet<M>, controller: &ControllerRef<M>) -> DecoratedHandlers
where
    M: DeserializeOwned + Send + 'static,
{
    let decorated = |slot| decorate(handlers.handler(slot), controller.clone());

    DecoratedHandlers {
        open: decorated(Slot::Open),
        message: report_failures(decorated(Slot::Message), handlers.on_error.clone()),
        close: decorated(Slot::Close),
        error: decorated(Slot::Error),
    }
}
