//! JSON codec at the message boundary.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::error::{BoxError, Error, HandlerPanicked, Kind};
use crate::handler::OnMessage;

const MISSING_HANDLER: &str = "onMessage handler is missing";
const HANDLER_FAILED: &str =
    "unexpected error while handling message, probably raised by the onMessage handler";

/// Decode an inbound payload.
///
/// Absent and empty payloads decode to `None`; they are not an error.
pub fn decode_message<M: DeserializeOwned>(raw: Option<&str>) -> Result<Option<M>> {
    let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };

    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| Error::decode(raw, e))
}

/// Serialize an outbound payload.
pub fn encode_message<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    serde_json::to_string(payload).map_err(Error::encode)
}

/// Decode `raw` and hand the result to `on_message`.
///
/// A missing handler is a misconfiguration and fails even for empty payloads.
/// Decode errors are returned as is; anything the handler returns or panics
/// with becomes a [`Kind::Connection`] error, unless the handler itself
/// returned a [`Kind::Decode`] error.
pub fn dispatch_message<M: DeserializeOwned>(
    raw: Option<&str>,
    on_message: Option<&OnMessage<M>>,
) -> Result<()> {
    let Some(on_message) = on_message else {
        return Err(Error::connection(MISSING_HANDLER));
    };

    let Some(message) = decode_message::<M>(raw)? else {
        return Ok(());
    };

    match panic::catch_unwind(AssertUnwindSafe(|| on_message(message))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(rewrap(e)),
        Err(payload) => Err(Error::with_source(
            Kind::Connection,
            HANDLER_FAILED,
            HandlerPanicked {
                message: panic_message(payload.as_ref()),
            },
        )),
    }
}

fn rewrap(error: BoxError) -> Error {
    match error.downcast::<Error>() {
        Ok(error) if error.kind() == Kind::Decode => *error,
        Ok(error) => Error::with_source(Kind::Connection, HANDLER_FAILED, *error),
        Err(other) => Error::with_source(Kind::Connection, HANDLER_FAILED, other),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
