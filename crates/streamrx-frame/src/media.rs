use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Whether a unit carries video or audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

/// Video frame dependency class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Delta,
    Key,
}

impl FrameType {
    /// Wire value of the frame type byte.
    pub fn to_wire(self) -> u8 {
        match self {
            FrameType::Delta => 0,
            FrameType::Key => 1,
        }
    }

    /// Any non-zero byte marks a key frame.
    pub fn from_wire(byte: u8) -> Self {
        if byte == 0 {
            FrameType::Delta
        } else {
            FrameType::Key
        }
    }
}

/// Compressed media packet produced by depacketization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    pub kind: MediaKind,
    /// Key/delta for video; `None` for audio.
    pub frame_type: Option<FrameType>,
    /// Presentation timestamp in milliseconds, the depacketization wire unit.
    pub timestamp_ms: u64,
    /// Duration in microseconds, zero when unknown.
    pub duration_us: u64,
    pub payload: Bytes,
}

impl EncodedUnit {
    pub fn is_key(&self) -> bool {
        self.frame_type == Some(FrameType::Key)
    }

    /// Presentation timestamp in the microseconds decoded frames carry.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_ms.saturating_mul(1000)
    }
}

/// Decoded audio or video unit.
///
/// Not `Clone`: a frame is owned by exactly one stage at a time and moves
/// down the chain.
#[derive(Debug, PartialEq, Eq)]
pub struct MediaFrame {
    pub kind: MediaKind,
    /// Presentation timestamp in microseconds.
    pub timestamp_us: u64,
    /// Duration in microseconds.
    pub duration_us: u64,
    /// Decoded samples or pixels; layout is defined by the codec backend.
    pub data: Bytes,
}

impl MediaFrame {
    pub fn new(kind: MediaKind, timestamp_us: u64, duration_us: u64, data: Bytes) -> Self {
        Self {
            kind,
            timestamp_us,
            duration_us,
            data,
        }
    }
}
