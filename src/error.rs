use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

/// Boxed error returned by user callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Error related to establishing, using or dispatching on a connection
    Connection,
    /// Inbound payload could not be decoded as JSON
    Decode,
    /// Outbound payload could not be serialized
    Encode,
}

/// Error raised by connection operations.
///
/// Every [`Kind`] is a connection error; [`Kind::Decode`] and [`Kind::Encode`]
/// narrow it down to the message boundary. Decode errors additionally carry the
/// raw payload that failed to parse.
#[derive(Debug)]
pub struct Error {
    kind: Kind,
    message: String,
    source: Option<BoxError>,
    data: Option<String>,
    backtrace: Backtrace,
}

impl Error {
    fn new<S: Into<String>>(kind: Kind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            data: None,
            backtrace: Backtrace::capture(),
        }
    }

    pub fn with_source<M, S>(kind: Kind, message: M, source: S) -> Self
    where
        M: Into<String>,
        S: Into<BoxError>,
    {
        Self {
            source: Some(source.into()),
            ..Self::new(kind, message)
        }
    }

    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::new(Kind::Connection, message)
    }

    pub fn decode<S: Into<String>>(raw: S, source: serde_json::Error) -> Self {
        Self {
            data: Some(raw.into()),
            ..Self::with_source(
                Kind::Decode,
                "could not decode JSON message payload",
                source,
            )
        }
    }

    #[must_use]
    pub fn encode(source: serde_json::Error) -> Self {
        Self::with_source(Kind::Encode, "could not serialize message payload", source)
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Always `true`: decode and encode errors are specialised connection errors.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self.kind, Kind::Connection | Kind::Decode | Kind::Encode)
    }

    /// User-facing description of what went wrong.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Raw payload attached to a [`Kind::Decode`] error.
    #[must_use]
    pub fn raw_payload(&self) -> Option<&str> {
        self.data.as_deref()
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    #[must_use]
    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}: {}", self.kind, self.message, src),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A user callback panicked while handling a message.
#[non_exhaustive]
#[derive(Debug)]
pub struct HandlerPanicked {
    pub message: String,
}

impl fmt::Display for HandlerPanicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler panicked: {}", self.message)
    }
}

impl StdError for HandlerPanicked {}
