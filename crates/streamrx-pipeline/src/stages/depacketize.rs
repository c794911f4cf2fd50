use async_trait::async_trait;
use bytes::Bytes;
use streamrx_frame::{decode_packet, MediaKind};
use tracing::debug;

use crate::config::StageConfig;
use crate::error::Result;
use crate::stage::{Lifecycle, Stage};

/// Splits raw channel packets into encoded units.
///
/// The media kind and nominal unit duration come from the stage config.
pub struct Depacketize {
    base: Box<dyn Stage>,
    lifecycle: Lifecycle,
    kind: MediaKind,
    duration_us: u64,
}

impl Depacketize {
    pub fn new(base: Box<dyn Stage>) -> Self {
        Self {
            base,
            lifecycle: Lifecycle::new(),
            kind: MediaKind::Video,
            duration_us: 0,
        }
    }
}

#[async_trait]
impl Stage for Depacketize {
    fn name(&self) -> &str {
        "Depacketize"
    }

    fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
        Some(self.base.as_mut())
    }

    async fn setup(&mut self, config: &StageConfig) -> Result<()> {
        if !self.lifecycle.begin_setup() {
            return Ok(());
        }
        self.kind = config.kind;
        self.duration_us = config.frame_duration_us();
        self.base.setup(config).await?;
        self.lifecycle.finish_setup();
        Ok(())
    }

    async fn cleanup(&mut self) {
        if self.lifecycle.close() {
            self.base.cleanup().await;
        }
    }

    async fn submit_packet(&mut self, packet: Bytes) {
        if !self.lifecycle.accepts(self.name(), "packet") {
            return;
        }
        match decode_packet(self.kind, &packet) {
            Ok(mut unit) => {
                unit.duration_us = self.duration_us;
                self.base.submit_unit(unit).await;
            }
            Err(err) => debug!(error = %err, "dropping malformed packet"),
        }
    }
}
