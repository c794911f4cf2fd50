use async_trait::async_trait;
use streamrx_frame::MediaFrame;
use streamrx_transport::{track_pair, TrackWriter};
use tracing::debug;

use crate::config::StageConfig;
use crate::error::Result;
use crate::stage::{Lifecycle, Stage};

/// Feeds decoded frames into a platform track handed to its base at setup.
pub struct TrackGenerate {
    base: Box<dyn Stage>,
    lifecycle: Lifecycle,
    writer: Option<TrackWriter>,
}

impl TrackGenerate {
    pub fn new(base: Box<dyn Stage>) -> Self {
        Self {
            base,
            lifecycle: Lifecycle::new(),
            writer: None,
        }
    }
}

#[async_trait]
impl Stage for TrackGenerate {
    fn name(&self) -> &str {
        "TrackGenerate"
    }

    fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
        Some(self.base.as_mut())
    }

    async fn setup(&mut self, config: &StageConfig) -> Result<()> {
        if !self.lifecycle.begin_setup() {
            return Ok(());
        }
        self.base.setup(config).await?;
        let (writer, track) = track_pair(config.kind);
        debug!(track = track.id(), "track generated");
        self.base.submit_track(track).await;
        self.writer = Some(writer);
        self.lifecycle.finish_setup();
        Ok(())
    }

    async fn cleanup(&mut self) {
        if self.lifecycle.close() {
            // Dropping the writer ends the track.
            self.writer = None;
            self.base.cleanup().await;
        }
    }

    async fn submit_frame(&mut self, frame: MediaFrame) {
        if !self.lifecycle.accepts(self.name(), "frame") {
            return;
        }
        let Some(writer) = &self.writer else {
            return;
        };
        if let Err(frame) = writer.write(frame) {
            debug!(timestamp_us = frame.timestamp_us, "track consumer gone, dropping frame");
        }
    }
}
