#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod reconnect;
pub mod state;
pub mod timer;
pub mod transport;

pub use config::Config;
pub use connection::{Connection, ControllerRef, Phase};
pub use error::{Error, Kind};
pub use handler::{HandlerResult, HandlerSet};
pub use state::{Action, ConnectionState};

pub type Result<T> = std::result::Result<T, Error>;
