use std::sync::Arc;

use async_trait::async_trait;
use streamrx_frame::{EncodedUnit, MediaKind};
use tracing::{debug, info, warn};

use crate::config::StageConfig;
use crate::environment::{CodecBackend, Decoder};
use crate::error::{PipelineError, Result};
use crate::stage::{Lifecycle, Stage};

/// Decodes encoded units with the first codec from the session's priority
/// list the backend can open.
///
/// Video delta units are dropped until the first key unit arrives.
pub struct Decode {
    name: &'static str,
    base: Box<dyn Stage>,
    lifecycle: Lifecycle,
    backend: Arc<dyn CodecBackend>,
    decoder: Option<Box<dyn Decoder>>,
    codec: Option<String>,
    awaiting_key: bool,
}

impl Decode {
    pub fn new(name: &'static str, base: Box<dyn Stage>, backend: Arc<dyn CodecBackend>) -> Self {
        Self {
            name,
            base,
            lifecycle: Lifecycle::new(),
            backend,
            decoder: None,
            codec: None,
            awaiting_key: true,
        }
    }

    /// Codec chosen during setup.
    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }
}

#[async_trait]
impl Stage for Decode {
    fn name(&self) -> &str {
        self.name
    }

    fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
        Some(self.base.as_mut())
    }

    async fn setup(&mut self, config: &StageConfig) -> Result<()> {
        if !self.lifecycle.begin_setup() {
            return Ok(());
        }
        let opened = config
            .codecs()
            .iter()
            .find_map(|codec| Some((codec.clone(), self.backend.open(codec, config.kind)?)));
        let Some((codec, decoder)) = opened else {
            return Err(PipelineError::UnsupportedCodec {
                requested: config.codecs().to_vec(),
            });
        };
        info!(stage = self.name, codec = %codec, kind = config.kind.as_str(), "decoder configured");
        self.decoder = Some(decoder);
        self.codec = Some(codec);
        self.awaiting_key = config.kind == MediaKind::Video;

        self.base.setup(config).await?;
        self.lifecycle.finish_setup();
        Ok(())
    }

    async fn cleanup(&mut self) {
        if self.lifecycle.close() {
            self.decoder = None;
            self.base.cleanup().await;
        }
    }

    async fn submit_unit(&mut self, unit: EncodedUnit) {
        if !self.lifecycle.accepts(self.name, "unit") {
            return;
        }
        if self.awaiting_key {
            if unit.frame_type.is_some() && !unit.is_key() {
                debug!(stage = self.name, timestamp_ms = unit.timestamp_ms, "dropping delta before key unit");
                return;
            }
            self.awaiting_key = false;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        match decoder.decode(unit) {
            Ok(Some(frame)) => self.base.submit_frame(frame).await,
            Ok(None) => {}
            Err(reason) => warn!(stage = self.name, %reason, "decode failed, dropping unit"),
        }
    }
}
