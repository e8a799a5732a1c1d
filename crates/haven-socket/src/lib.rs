//! Persistent duplex channel to the chat server.
//!
//! [`Transport`] abstracts the wire; [`WsTransport`] is the production
//! WebSocket implementation and [`ScriptedTransport`] the test double.
//! [`ConnectionManager`] owns the single active channel, parses inbound
//! frames at the boundary, and publishes connection state.

pub mod manager;
pub mod scripted;
pub mod transport;
pub mod ws;

pub use manager::ConnectionManager;
pub use scripted::{ScriptedLink, ScriptedTransport};
pub use transport::{Transport, TransportLink};
pub use ws::WsTransport;
