//! Logical channels over one session transport.
//!
//! Two channel variants share the [`Channel`] interface:
//! - [`DataChannel`]: many channels multiplexed over one duplex message
//!   [`Connection`], each message prefixed with its one-byte channel id
//! - [`TrackChannel`]: one channel bound to one native [`PlatformTrack`],
//!   no framing, single producer
//!
//! [`SessionTransport`] owns both for the lifetime of a session and decides
//! per host stream which one carries it.

pub mod channel;
pub mod data;
pub mod error;
pub mod session;
pub mod stream;
pub mod track;

pub use channel::{Channel, ChannelAttributes, ChannelReceiver, TransportKind};
pub use data::{Connection, DataChannel, DataTransport, MemoryConnection};
pub use error::{CloseReason, Result, TransportError};
pub use session::{HostStream, SessionTransport, TransportConfig, TransportState, TransportStats};
#[cfg(unix)]
pub use stream::connect_unix;
pub use stream::{spawn_pump, StreamConnection};
pub use track::{track_pair, PlatformTrack, TrackChannel, TrackTransport, TrackWriter};
