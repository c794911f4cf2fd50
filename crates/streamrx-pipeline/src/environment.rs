//! What one execution context offers: capabilities, codecs and the decoder
//! backend behind them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use streamrx_frame::{EncodedUnit, MediaFrame, MediaKind};

use crate::config::{Capability, ExecutionContext};

/// An open decoder for one codec.
pub trait Decoder: Send {
    /// Decode one unit. `Ok(None)` when the unit produced no output yet.
    fn decode(&mut self, unit: EncodedUnit) -> Result<Option<MediaFrame>, String>;
}

/// Source of decoders. The codec implementation itself lives behind this
/// seam.
pub trait CodecBackend: Send + Sync {
    /// Codec names this backend can open, in preference order.
    fn codecs(&self) -> Vec<String>;

    /// Open a decoder, or `None` if the codec is not available for `kind`.
    fn open(&self, codec: &str, kind: MediaKind) -> Option<Box<dyn Decoder>>;
}

/// Backend whose decoders hand the compressed payload through unchanged.
#[derive(Debug, Clone)]
pub struct PassthroughCodec {
    video: Vec<String>,
    audio: Vec<String>,
}

impl PassthroughCodec {
    pub fn new<V, A>(video: V, audio: A) -> Self
    where
        V: IntoIterator,
        V::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            video: video.into_iter().map(Into::into).collect(),
            audio: audio.into_iter().map(Into::into).collect(),
        }
    }

    /// A backend with no codecs at all.
    pub fn none() -> Self {
        Self {
            video: Vec::new(),
            audio: Vec::new(),
        }
    }
}

impl Default for PassthroughCodec {
    fn default() -> Self {
        Self::new(["h264", "h265", "av1"], ["opus"])
    }
}

impl CodecBackend for PassthroughCodec {
    fn codecs(&self) -> Vec<String> {
        self.video.iter().chain(&self.audio).cloned().collect()
    }

    fn open(&self, codec: &str, kind: MediaKind) -> Option<Box<dyn Decoder>> {
        let known = match kind {
            MediaKind::Video => &self.video,
            MediaKind::Audio => &self.audio,
        };
        known
            .iter()
            .any(|name| name == codec)
            .then(|| Box::new(PassthroughDecoder) as Box<dyn Decoder>)
    }
}

struct PassthroughDecoder;

impl Decoder for PassthroughDecoder {
    fn decode(&mut self, unit: EncodedUnit) -> Result<Option<MediaFrame>, String> {
        Ok(Some(MediaFrame::new(
            unit.kind,
            unit.timestamp_us(),
            unit.duration_us,
            unit.payload,
        )))
    }
}

/// Description of one execution context.
#[derive(Clone)]
pub struct Environment {
    context: ExecutionContext,
    capabilities: BTreeSet<Capability>,
    backend: Arc<dyn CodecBackend>,
}

impl Environment {
    /// A context with no capabilities and no codecs.
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            capabilities: BTreeSet::new(),
            backend: Arc::new(PassthroughCodec::none()),
        }
    }

    /// A context offering every capability with the default passthrough
    /// codecs.
    pub fn full(context: ExecutionContext) -> Self {
        Self::new(context)
            .with_capabilities(Capability::ALL)
            .with_backend(Arc::new(PassthroughCodec::default()))
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    pub fn without_capability(mut self, capability: Capability) -> Self {
        self.capabilities.remove(&capability);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn CodecBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn satisfies(&self, requirements: &[Capability]) -> bool {
        requirements.iter().all(|cap| self.has(*cap))
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    pub fn codecs(&self) -> Vec<String> {
        self.backend.codecs()
    }

    pub fn backend(&self) -> &Arc<dyn CodecBackend> {
        &self.backend
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("context", &self.context)
            .field("capabilities", &self.capabilities)
            .field("codecs", &self.codecs())
            .finish()
    }
}
