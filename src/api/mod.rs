//! Dashboard API: REST endpoints over the store plus a WebSocket feed
//! of new-record notifications.

pub mod http;
pub mod rest;
pub mod websocket;

pub use http::create_router;
