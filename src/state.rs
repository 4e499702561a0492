//! Connection state snapshot and the transitions that update it.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle snapshot published to consumers.
///
/// `is_connecting` implies `is_loading`: entering a connect attempt always
/// re-enters the loading state.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub is_loading: bool,
    pub is_connecting: bool,
    pub is_connected: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl ConnectionState {
    pub const INITIAL: Self = Self {
        is_loading: true,
        is_connecting: false,
        is_connected: false,
    };

    /// Pure transition: returns the state after `action`.
    #[must_use]
    pub const fn apply(self, action: Action) -> Self {
        match action {
            Action::SetLoading(value) => Self {
                is_loading: value,
                ..self
            },
            Action::SetConnected(value) => Self {
                is_connected: value,
                ..self
            },
            Action::SetConnecting(value) => Self {
                is_connecting: value,
                is_loading: true,
                ..self
            },
        }
    }
}

/// The three transitions a [`ConnectionState`] accepts.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetLoading(bool),
    SetConnected(bool),
    SetConnecting(bool),
}

impl Action {
    /// Resolve a wire tag such as `SET_CONNECTED`.
    #[must_use]
    pub fn from_tag(tag: &str, value: bool) -> Option<Self> {
        match tag {
            "SET_LOADING" => Some(Self::SetLoading(value)),
            "SET_CONNECTED" => Some(Self::SetConnected(value)),
            "SET_CONNECTING" => Some(Self::SetConnecting(value)),
            _ => None,
        }
    }

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::SetLoading(_) => "SET_LOADING",
            Self::SetConnected(_) => "SET_CONNECTED",
            Self::SetConnecting(_) => "SET_CONNECTING",
        }
    }
}

/// Untyped update in the `{"type": ..., "payload": {"value": ...}}` shape.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: RawPayload,
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub value: bool,
}

impl RawAction {
    pub fn new<S: Into<String>>(kind: S, value: bool) -> Self {
        Self {
            kind: kind.into(),
            payload: RawPayload { value },
        }
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let value = match action {
            Action::SetLoading(v) | Action::SetConnected(v) | Action::SetConnecting(v) => v,
        };
        Self::new(action.tag(), value)
    }
}

/// Observable holder of the current [`ConnectionState`].
///
/// Each dispatch is a single atomic read-modify-write on the underlying
/// [`watch`] channel, so concurrent dispatches never lose an update.
#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<ConnectionState>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(ConnectionState::INITIAL)
    }
}

impl StateStore {
    #[must_use]
    pub fn new(initial: ConnectionState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Apply `action` and return the resulting state.
    pub fn dispatch(&self, action: Action) -> ConnectionState {
        let mut next = ConnectionState::INITIAL;
        self.tx.send_modify(|state| {
            *state = state.apply(action);
            next = *state;
        });
        next
    }

    /// Apply an untyped update.
    ///
    /// # Panics
    ///
    /// Panics when the tag names no known transition. Callers only ever send
    /// the three tags above, so anything else is a programming error.
    pub fn dispatch_raw(&self, action: &RawAction) -> ConnectionState {
        let Some(typed) = Action::from_tag(&action.kind, action.payload.value) else {
            panic!("state reducer: unknown action type <{}>", action.kind);
        };
        self.dispatch(typed)
    }

    #[must_use]
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}
