use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use streamrx_frame::{FrameConfig, HOST_AUDIO, HOST_VIDEO};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelAttributes, TransportKind};
use crate::data::{DataChannel, DataTransport};
use crate::error::{CloseReason, Result, TransportError};
use crate::track::{TrackChannel, TrackTransport};

/// Session transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Message framing limits for stream-backed connections.
    pub frame: FrameConfig,
    /// Attributes of the host video channel when it is carried as data.
    pub host_video: ChannelAttributes,
    /// Attributes of the host audio channel when it is carried as data.
    pub host_audio: ChannelAttributes,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            host_video: ChannelAttributes::UNRELIABLE_ORDERED,
            host_audio: ChannelAttributes::UNRELIABLE_ORDERED,
        }
    }
}

/// Connection state of a session transport.
///
/// Observers only ever see the latest state; transitions that happened
/// before they subscribed are not replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Disconnected,
    Closed(CloseReason),
}

/// The channel chosen for one host media stream.
#[derive(Debug)]
pub enum HostStream {
    Track(TrackChannel),
    Data(DataChannel),
}

impl HostStream {
    pub fn kind(&self) -> TransportKind {
        match self {
            HostStream::Track(_) => TransportKind::Track,
            HostStream::Data(_) => TransportKind::Data,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            HostStream::Track(channel) => channel.id(),
            HostStream::Data(channel) => channel.id(),
        }
    }
}

/// Best-effort transport statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub messages_in: u64,
    pub messages_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub dropped: u64,
    pub open_channels: usize,
    pub buffered_bytes: Option<usize>,
}

struct SessionInner {
    config: TransportConfig,
    data: Option<DataTransport>,
    tracks: Option<TrackTransport>,
    state: watch::Sender<TransportState>,
    connected_once: AtomicBool,
    closed: AtomicBool,
}

/// Session-scoped owner of the data and track transports.
///
/// Cloning is cheap; clones observe and control the same session.
#[derive(Clone)]
pub struct SessionTransport {
    inner: Arc<SessionInner>,
}

impl SessionTransport {
    pub fn new(
        config: TransportConfig,
        data: Option<DataTransport>,
        tracks: Option<TrackTransport>,
    ) -> Self {
        let (state, _) = watch::channel(TransportState::Connecting);
        Self {
            inner: Arc::new(SessionInner {
                config,
                data,
                tracks,
                state,
                connected_once: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    pub fn data(&self) -> Option<&DataTransport> {
        self.inner.data.as_ref()
    }

    pub fn tracks(&self) -> Option<&TrackTransport> {
        self.inner.tracks.as_ref()
    }

    pub fn state(&self) -> TransportState {
        *self.inner.state.borrow()
    }

    /// Watch state changes from now on.
    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.inner.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn mark_connected(&self) {
        if self.is_closed() {
            return;
        }
        self.inner.connected_once.store(true, Ordering::SeqCst);
        self.inner.state.send_replace(TransportState::Connected);
        info!("transport connected");
    }

    pub fn mark_disconnected(&self) {
        if self.is_closed() {
            return;
        }
        self.inner.state.send_replace(TransportState::Disconnected);
        warn!("transport disconnected");
    }

    /// Close the session with `reason`. Only the first call has an effect;
    /// returns whether this call closed it.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!(%reason, "transport already closed");
            return false;
        }
        if let Some(data) = &self.inner.data {
            data.close();
        }
        if let Some(tracks) = &self.inner.tracks {
            tracks.close();
        }
        self.inner.state.send_replace(TransportState::Closed(reason));
        info!(%reason, "transport closed");
        true
    }

    /// Close after a connection failure, distinguishing failures before the
    /// first successful connect.
    pub fn fail(&self) -> bool {
        let reason = if self.inner.connected_once.load(Ordering::SeqCst) {
            CloseReason::Failed
        } else {
            CloseReason::FailedNoConnect
        };
        self.close(reason)
    }

    /// Declare a data channel on the session.
    pub fn open_channel(&self, id: u8, attributes: ChannelAttributes) -> Result<DataChannel> {
        self.ensure_open()?;
        let data = self
            .inner
            .data
            .as_ref()
            .ok_or(TransportError::UnknownChannel(id))?;
        data.open_channel(id, attributes)
    }

    /// Look up an already declared data channel.
    pub fn channel(&self, id: u8) -> Option<DataChannel> {
        self.inner.data.as_ref()?.channel(id)
    }

    /// Pick the host video carrier from `priority`.
    pub fn setup_host_video(&self, priority: &[TransportKind]) -> Result<HostStream> {
        self.setup_host_stream("host video", HOST_VIDEO, self.inner.config.host_video, priority)
    }

    /// Pick the host audio carrier from `priority`.
    pub fn setup_host_audio(&self, priority: &[TransportKind]) -> Result<HostStream> {
        self.setup_host_stream("host audio", HOST_AUDIO, self.inner.config.host_audio, priority)
    }

    pub fn estimated_buffered_bytes(&self) -> Option<usize> {
        self.inner.data.as_ref()?.estimated_buffered_bytes()
    }

    pub fn get_stats(&self) -> TransportStats {
        let Some(data) = &self.inner.data else {
            return TransportStats::default();
        };
        let counters = data.counters();
        TransportStats {
            messages_in: counters.messages_in,
            messages_out: counters.messages_out,
            bytes_in: counters.bytes_in,
            bytes_out: counters.bytes_out,
            dropped: counters.dropped,
            open_channels: data.open_channel_count(),
            buffered_bytes: data.estimated_buffered_bytes(),
        }
    }

    fn setup_host_stream(
        &self,
        stream: &'static str,
        channel: u8,
        attributes: ChannelAttributes,
        priority: &[TransportKind],
    ) -> Result<HostStream> {
        self.ensure_open()?;
        for kind in priority {
            match kind {
                TransportKind::Track => {
                    let Some(tracks) = &self.inner.tracks else {
                        continue;
                    };
                    if !tracks.supports(channel) {
                        continue;
                    }
                    match tracks.open(channel) {
                        Ok(track) => {
                            info!(stream, kind = "track", "host stream negotiated");
                            return Ok(HostStream::Track(track));
                        }
                        // Taken between the check and the open.
                        Err(TransportError::TrackTaken(_)) => {
                            debug!(stream, channel, "track already taken");
                            continue;
                        }
                        Err(err) => return Err(err),
                    }
                }
                TransportKind::Data => {
                    let Some(data) = &self.inner.data else {
                        continue;
                    };
                    let channel = data.open_channel(channel, attributes)?;
                    info!(stream, kind = "data", "host stream negotiated");
                    return Ok(HostStream::Data(channel));
                }
            }
        }
        Err(TransportError::NoSupportedTransport { stream })
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            TransportState::Closed(reason) => Err(TransportError::Closed(reason)),
            _ => Ok(()),
        }
    }
}
