//! Transports carrying protocol messages to and from the engine
//!
//! The session only needs an outbound `send_message`; inbound traffic is
//! handed to it through an unbounded channel of [`Inbound`] values, drained by
//! the harness dispatch loop.

pub mod channel;
pub mod codec;
pub mod process;

use crate::common::Result;
use crate::protocol::ChannelId;

pub use crate::protocol::Inbound;
pub use channel::ChannelTransport;
pub use process::{EngineHost, ProcessTransport};

/// Outbound half of a transport
///
/// Fire-and-forget: returning `Ok` only means the message was queued.
pub trait Transport: Send + Sync {
    fn send_message(&self, message: &str, channel: ChannelId) -> Result<()>;
}
