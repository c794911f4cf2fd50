use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a session transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    /// The transport never reached the connected state.
    FailedNoConnect,
    /// The connection failed after it was established.
    Failed,
    /// The session was ended deliberately by either side.
    Disconnect,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::FailedNoConnect => "failednoconnect",
            CloseReason::Failed => "failed",
            CloseReason::Disconnect => "disconnect",
        };
        f.write_str(text)
    }
}

/// Errors that can occur in channel and transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A received message could not be routed to any channel.
    #[error("delivery dropped on channel {channel:?}: {reason}")]
    ChannelDeliveryDropped {
        channel: Option<u8>,
        reason: String,
    },

    /// The channel id was never opened on this transport.
    #[error("channel {0} is not open")]
    UnknownChannel(u8),

    /// A channel was reopened with attributes different from the first open.
    #[error("channel {channel} already open with different attributes")]
    AttributeConflict { channel: u8 },

    /// None of the caller's preferred transport kinds is available.
    #[error("no supported transport for {stream}")]
    NoSupportedTransport { stream: &'static str },

    /// The track bound to a channel was already handed out.
    #[error("track for channel {0} already taken")]
    TrackTaken(u8),

    /// The transport has been closed.
    #[error("transport closed: {0}")]
    Closed(CloseReason),

    /// Frame-level error on the underlying connection.
    #[error("frame error: {0}")]
    Frame(#[from] streamrx_frame::FrameError),

    /// An I/O error occurred on the underlying connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
