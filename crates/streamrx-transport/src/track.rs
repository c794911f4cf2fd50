use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use streamrx_frame::{channel_name, MediaFrame, MediaKind};
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::{Channel, ChannelAttributes, TransportKind};
use crate::error::{Result, TransportError};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// A native media track: an ordered stream of decoded frames from a single
/// producer.
///
/// Not `Clone`. Moving the handle moves the track; whoever holds it is the
/// only consumer.
#[derive(Debug)]
pub struct PlatformTrack {
    id: String,
    kind: MediaKind,
    frames: mpsc::UnboundedReceiver<MediaFrame>,
}

impl PlatformTrack {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Wait for the next frame. `None` once the producer is gone.
    pub async fn next_frame(&mut self) -> Option<MediaFrame> {
        self.frames.recv().await
    }

    /// Take the next frame if one is already queued.
    pub fn try_next_frame(&mut self) -> Option<MediaFrame> {
        self.frames.try_recv().ok()
    }
}

/// Producer half of a [`PlatformTrack`].
#[derive(Debug)]
pub struct TrackWriter {
    id: String,
    kind: MediaKind,
    tx: mpsc::UnboundedSender<MediaFrame>,
}

impl TrackWriter {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Push a frame into the track. Hands the frame back if the consumer
    /// has gone away.
    pub fn write(&self, frame: MediaFrame) -> std::result::Result<(), MediaFrame> {
        self.tx.send(frame).map_err(|err| err.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a connected track writer and track.
pub fn track_pair(kind: MediaKind) -> (TrackWriter, PlatformTrack) {
    let id = format!(
        "{}-track-{}",
        kind.as_str(),
        NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed)
    );
    let (tx, frames) = mpsc::unbounded_channel();
    (
        TrackWriter {
            id: id.clone(),
            kind,
            tx,
        },
        PlatformTrack { id, kind, frames },
    )
}

struct TrackSlot {
    attributes: ChannelAttributes,
    track: Option<PlatformTrack>,
}

/// Logical channels each bound to one dedicated native track.
///
/// The native layer binds a track when the remote side announces it; the
/// session takes it out exactly once.
#[derive(Clone, Default)]
pub struct TrackTransport {
    slots: Arc<Mutex<HashMap<u8, TrackSlot>>>,
}

impl TrackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a remote track to a channel id. A later bind replaces an
    /// untaken track.
    pub fn bind(&self, channel: u8, attributes: ChannelAttributes, track: PlatformTrack) {
        debug!(
            channel,
            name = channel_name(channel),
            track = track.id(),
            "track bound"
        );
        self.slots().insert(
            channel,
            TrackSlot {
                attributes,
                track: Some(track),
            },
        );
    }

    /// Whether `channel` has a bound track that has not been taken yet.
    pub fn supports(&self, channel: u8) -> bool {
        self.slots()
            .get(&channel)
            .is_some_and(|slot| slot.track.is_some())
    }

    /// Take the channel bound to `channel` together with its track.
    pub fn open(&self, channel: u8) -> Result<TrackChannel> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(&channel)
            .ok_or(TransportError::UnknownChannel(channel))?;
        let track = slot.track.take().ok_or(TransportError::TrackTaken(channel))?;
        Ok(TrackChannel {
            id: channel,
            attributes: slot.attributes,
            track,
        })
    }

    /// Drop every bound track.
    pub fn close(&self) {
        self.slots().clear();
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<u8, TrackSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A logical channel carried by a dedicated track.
#[derive(Debug)]
pub struct TrackChannel {
    id: u8,
    attributes: ChannelAttributes,
    track: PlatformTrack,
}

impl TrackChannel {
    pub fn into_track(self) -> PlatformTrack {
        self.track
    }
}

impl Channel for TrackChannel {
    fn id(&self) -> u8 {
        self.id
    }

    fn attributes(&self) -> ChannelAttributes {
        self.attributes
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Track
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use streamrx_frame::HOST_VIDEO;

    use super::*;

    #[test]
    fn track_delivers_frames_in_order() {
        let (writer, mut track) = track_pair(MediaKind::Video);
        for ts in 0..3 {
            writer
                .write(MediaFrame::new(MediaKind::Video, ts, 1, Bytes::new()))
                .unwrap();
        }
        let order: Vec<u64> = std::iter::from_fn(|| track.try_next_frame())
            .map(|f| f.timestamp_us)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn write_after_consumer_drop_returns_frame() {
        let (writer, track) = track_pair(MediaKind::Audio);
        drop(track);
        assert!(writer.is_closed());
        let frame = writer
            .write(MediaFrame::new(MediaKind::Audio, 5, 0, Bytes::new()))
            .unwrap_err();
        assert_eq!(frame.timestamp_us, 5);
    }

    #[test]
    fn bound_track_is_taken_once() {
        let transport = TrackTransport::new();
        let (_writer, track) = track_pair(MediaKind::Video);
        transport.bind(HOST_VIDEO, ChannelAttributes::UNRELIABLE_ORDERED, track);

        assert!(transport.supports(HOST_VIDEO));
        let channel = transport.open(HOST_VIDEO).unwrap();
        assert_eq!(channel.kind(), TransportKind::Track);
        assert_eq!(channel.id(), HOST_VIDEO);
        assert!(!transport.supports(HOST_VIDEO));
        assert!(matches!(
            transport.open(HOST_VIDEO).unwrap_err(),
            TransportError::TrackTaken(_)
        ));
        assert!(matches!(
            transport.open(99).unwrap_err(),
            TransportError::UnknownChannel(99)
        ));
    }
}
