//! Relay transport — one persistent websocket connection per client.

mod connection;
pub mod token;

pub use connection::{Connection, Reader, Writer};
