//! Live dashboard notifications
//!
//! Capture code announces new records through a [`Notifier`]; the
//! dashboard's WebSocket endpoint subscribes to a [`BroadcastNotifier`].
//! Notification is fire-and-forget: no subscriber, no effect.

mod broadcaster;
mod events;

pub use broadcaster::{BroadcastNotifier, Notifier, NoopNotifier};
pub use events::{ClientMessage, DashboardEvent, PongMessage, WelcomeMessage, WsMessage};
