use std::fmt;

use serde::{Deserialize, Serialize};
use streamrx_frame::MediaKind;

/// Type of the data flowing into or out of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipeType {
    RawBytes,
    EncodedUnit,
    MediaFrame,
    PlatformTrack,
}

impl PipeType {
    pub fn as_str(self) -> &'static str {
        match self {
            PipeType::RawBytes => "rawBytes",
            PipeType::EncodedUnit => "encodedUnit",
            PipeType::MediaFrame => "mediaFrame",
            PipeType::PlatformTrack => "platformTrack",
        }
    }
}

impl fmt::Display for PipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExecutionContext {
    /// The orchestrating context that owns the transport.
    Main,
    /// A background worker reached only by message passing.
    Worker,
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Main => f.write_str("Main"),
            ExecutionContext::Worker => f.write_str("Worker"),
        }
    }
}

/// A platform facility a stage may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    VideoDecoder,
    AudioDecoder,
    TrackGenerator,
    FrameRenderer,
    AudioOutput,
    WorkerMessaging,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::VideoDecoder,
        Capability::AudioDecoder,
        Capability::TrackGenerator,
        Capability::FrameRenderer,
        Capability::AudioOutput,
        Capability::WorkerMessaging,
    ];
}

/// Parameters negotiated for the session, shared by every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    /// Video codecs in priority order.
    pub video_codecs: Vec<String>,
    /// Audio codecs in priority order.
    pub audio_codecs: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel in one audio packet.
    pub audio_frame_samples: u32,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            video_codecs: vec!["h264".to_string()],
            audio_codecs: vec!["opus".to_string()],
            width: 1920,
            height: 1080,
            fps: 60,
            sample_rate: 48_000,
            channels: 2,
            audio_frame_samples: 480,
        }
    }
}

/// Configuration handed to `setup` of every stage in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub kind: MediaKind,
    pub session: SessionParams,
}

impl StageConfig {
    pub fn video(session: SessionParams) -> Self {
        Self {
            kind: MediaKind::Video,
            session,
        }
    }

    pub fn audio(session: SessionParams) -> Self {
        Self {
            kind: MediaKind::Audio,
            session,
        }
    }

    /// Codec priority list for this chain's media kind.
    pub fn codecs(&self) -> &[String] {
        match self.kind {
            MediaKind::Video => &self.session.video_codecs,
            MediaKind::Audio => &self.session.audio_codecs,
        }
    }

    /// Nominal duration of one unit in microseconds, zero when unknown.
    pub fn frame_duration_us(&self) -> u64 {
        match self.kind {
            MediaKind::Video if self.session.fps > 0 => 1_000_000 / u64::from(self.session.fps),
            MediaKind::Audio if self.session.sample_rate > 0 => {
                u64::from(self.session.audio_frame_samples) * 1_000_000
                    / u64::from(self.session.sample_rate)
            }
            _ => 0,
        }
    }
}

/// Stage names offloaded to a worker as one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPipes {
    pub pipes: Vec<String>,
}

/// One entry of a declarative stage list.
///
/// Serializes as either a bare stage name or `{"worker": {"pipes": [...]}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipeSpec {
    Stage(String),
    Worker { worker: WorkerPipes },
}

impl PipeSpec {
    pub fn stage(name: impl Into<String>) -> Self {
        PipeSpec::Stage(name.into())
    }

    pub fn worker<I, S>(pipes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PipeSpec::Worker {
            worker: WorkerPipes {
                pipes: pipes.into_iter().map(Into::into).collect(),
            },
        }
    }
}
