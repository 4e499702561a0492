#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Serialize, Serializer};
use ws_lifecycle::transport::{Connector, EventSlots, NativeEvent, TransportError, TransportHandle};
use ws_lifecycle::{Config, ConnectionState};

pub const URI: &str = "ws://mock.invalid/socket";

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[must_use]
pub fn config(auto_reconnect: bool) -> Config {
    Config::builder()
        .uri(URI)
        .auto_reconnect(auto_reconnect)
        .reconnect_check_interval(POLL_INTERVAL)
        .build()
}

/// `(is_loading, is_connecting, is_connected)`
#[must_use]
pub fn flags(state: ConnectionState) -> (bool, bool, bool) {
    (state.is_loading, state.is_connecting, state.is_connected)
}

/// In-memory socket whose events are fired by the test.
pub struct MockHandle {
    pub uri: String,
    slots: Arc<EventSlots>,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    accepting: AtomicBool,
}

impl MockHandle {
    pub fn fire(&self, event: &NativeEvent) -> ws_lifecycle::Result<()> {
        self.slots.emit(event)
    }

    #[must_use]
    pub fn slots(&self) -> &EventSlots {
        &self.slots
    }

    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }
}

impl TransportHandle for MockHandle {
    fn send(&self, text: String) -> Result<bool, TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        self.sent.lock().unwrap().push(text);
        Ok(self.accepting.load(Ordering::SeqCst))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Records every handle it opens.
#[derive(Clone, Default)]
pub struct MockConnector {
    handles: Arc<Mutex<Vec<Arc<MockHandle>>>>,
    failing: Arc<AtomicBool>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn opened(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    #[must_use]
    pub fn handle(&self, index: usize) -> Arc<MockHandle> {
        Arc::clone(&self.handles.lock().unwrap()[index])
    }

    #[must_use]
    pub fn last(&self) -> Arc<MockHandle> {
        Arc::clone(self.handles.lock().unwrap().last().unwrap())
    }
}

impl Connector for MockConnector {
    fn open(
        &self,
        uri: &str,
        slots: Arc<EventSlots>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Other("connection refused".to_owned()));
        }

        let handle = Arc::new(MockHandle {
            uri: uri.to_owned(),
            slots,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
        });
        self.handles.lock().unwrap().push(Arc::clone(&handle));

        Ok(handle)
    }
}

/// A payload serde refuses to serialize.
pub struct Unserializable;

impl Serialize for Unserializable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("refusing to serialize"))
    }
}
