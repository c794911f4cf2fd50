use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Delivery guarantees of one logical channel, fixed when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAttributes {
    pub reliable: bool,
    pub ordered: bool,
}

impl ChannelAttributes {
    pub const RELIABLE_ORDERED: Self = Self {
        reliable: true,
        ordered: true,
    };
    pub const UNRELIABLE_ORDERED: Self = Self {
        reliable: false,
        ordered: true,
    };
    pub const UNRELIABLE_UNORDERED: Self = Self {
        reliable: false,
        ordered: false,
    };
}

/// How a logical channel is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Dedicated native media track per channel.
    Track,
    /// Multiplexed over a shared byte connection.
    Data,
}

/// Interface shared by every logical channel variant.
pub trait Channel {
    /// Stable channel id.
    fn id(&self) -> u8;

    /// Attributes negotiated when the channel was opened.
    fn attributes(&self) -> ChannelAttributes;

    /// Which transport variant carries this channel.
    fn kind(&self) -> TransportKind;

    /// Bytes queued for sending but not yet on the wire, if known.
    fn estimated_buffered_bytes(&self) -> Option<usize> {
        None
    }
}

/// Receiving half of a channel subscription.
///
/// Yields `None` once the transport closes.
#[derive(Debug)]
pub struct ChannelReceiver {
    channel: u8,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl ChannelReceiver {
    pub(crate) fn new(channel: u8, rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { channel, rx }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Wait for the next payload.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take the next payload if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

impl futures_core::Stream for ChannelReceiver {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
