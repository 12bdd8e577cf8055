//! WebSocket endpoint streaming dashboard events
//!
//! Each client gets a welcome message with the current sequence id, then
//! every [`WsMessage`](crate::notify::WsMessage) as it is broadcast. A
//! lagging client is told how many events it missed.

pub mod handler;

pub use handler::ws_handler;
