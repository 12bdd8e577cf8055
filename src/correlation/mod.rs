//! Request correlation
//!
//! - [`CorrelationBuffer`]: in-flight request state keyed by request id
//! - [`token`]: start/finish pairing of nested calls through command text
//! - [`CommandInterceptor`]: data-access callbacks built on the two above

mod buffer;
mod interceptor;
pub mod token;

pub use buffer::CorrelationBuffer;
pub use interceptor::{sanitize_connection, Command, CommandInterceptor, DataCommand};
