//! In-memory transport
//!
//! Outbound messages are queued on an unbounded channel; whoever owns the
//! receiver plays the engine. Used to embed the session in-process and to
//! drive it from tests.

use tokio::sync::mpsc;

use crate::common::{Error, Result};
use crate::protocol::ChannelId;

use super::Transport;

/// Transport that hands every outbound message to a channel
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<(ChannelId, String)>,
}

impl ChannelTransport {
    /// Create the transport and the receiver observing its traffic
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ChannelId, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send_message(&self, message: &str, channel: ChannelId) -> Result<()> {
        self.tx
            .send((channel, message.to_string()))
            .map_err(|_| Error::TransportClosed("outbound receiver dropped".to_string()))
    }
}
