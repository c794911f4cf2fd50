use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use streamrx_frame::MediaFrame;
use streamrx_transport::PlatformTrack;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::builder::Terminal;
use crate::config::{PipeType, StageConfig};
use crate::error::Result;
use crate::stage::{Lifecycle, Stage};

/// Output surface of a terminal renderer: every presented frame, in order.
#[derive(Debug)]
pub struct FrameSink {
    frames: mpsc::UnboundedReceiver<MediaFrame>,
    interactions: Arc<AtomicU64>,
}

impl FrameSink {
    fn new() -> (mpsc::UnboundedSender<MediaFrame>, Arc<AtomicU64>, Self) {
        let (tx, frames) = mpsc::unbounded_channel();
        let interactions = Arc::new(AtomicU64::new(0));
        let sink = Self {
            frames,
            interactions: Arc::clone(&interactions),
        };
        (tx, interactions, sink)
    }

    /// Wait for the next presented frame. `None` once the renderer is gone.
    pub async fn recv(&mut self) -> Option<MediaFrame> {
        self.frames.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MediaFrame> {
        self.frames.try_recv().ok()
    }

    /// User gestures that reached the renderer.
    pub fn interactions(&self) -> u64 {
        self.interactions.load(Ordering::Relaxed)
    }
}

/// Terminal presenting decoded frames.
pub struct FrameRenderer {
    lifecycle: Lifecycle,
    output: mpsc::UnboundedSender<MediaFrame>,
    interactions: Arc<AtomicU64>,
}

#[async_trait]
impl Stage for FrameRenderer {
    fn name(&self) -> &str {
        "FrameRenderer"
    }

    fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
        None
    }

    async fn setup(&mut self, config: &StageConfig) -> Result<()> {
        if self.lifecycle.begin_setup() {
            info!(kind = config.kind.as_str(), "frame renderer ready");
            self.lifecycle.finish_setup();
        }
        Ok(())
    }

    async fn cleanup(&mut self) {
        if self.lifecycle.close() {
            debug!("frame renderer closed");
        }
    }

    async fn on_user_interaction(&mut self) {
        self.interactions.fetch_add(1, Ordering::Relaxed);
    }

    async fn submit_frame(&mut self, frame: MediaFrame) {
        if !self.lifecycle.accepts(self.name(), "frame") {
            return;
        }
        if self.output.send(frame).is_err() {
            debug!("frame sink dropped");
        }
    }
}

/// Terminal playing a platform track.
pub struct TrackRenderer {
    lifecycle: Lifecycle,
    output: mpsc::UnboundedSender<MediaFrame>,
    interactions: Arc<AtomicU64>,
    playback: Option<JoinHandle<()>>,
}

#[async_trait]
impl Stage for TrackRenderer {
    fn name(&self) -> &str {
        "TrackRenderer"
    }

    fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
        None
    }

    async fn setup(&mut self, config: &StageConfig) -> Result<()> {
        if self.lifecycle.begin_setup() {
            info!(kind = config.kind.as_str(), "track renderer ready");
            self.lifecycle.finish_setup();
        }
        Ok(())
    }

    async fn cleanup(&mut self) {
        if self.lifecycle.close() {
            if let Some(playback) = self.playback.take() {
                playback.abort();
            }
            debug!("track renderer closed");
        }
    }

    async fn on_user_interaction(&mut self) {
        self.interactions.fetch_add(1, Ordering::Relaxed);
    }

    async fn submit_track(&mut self, mut track: PlatformTrack) {
        if !self.lifecycle.accepts(self.name(), "track") {
            return;
        }
        if let Some(previous) = self.playback.take() {
            previous.abort();
        }
        info!(track = track.id(), "playing track");
        let output = self.output.clone();
        self.playback = Some(tokio::spawn(async move {
            while let Some(frame) = track.next_frame().await {
                if output.send(frame).is_err() {
                    break;
                }
            }
        }));
    }
}

/// Terminal accepting decoded frames, and the sink observing its output.
pub fn frame_renderer() -> (Terminal, FrameSink) {
    let (output, interactions, sink) = FrameSink::new();
    let renderer = FrameRenderer {
        lifecycle: Lifecycle::new(),
        output,
        interactions,
    };
    (Terminal::new(PipeType::MediaFrame, Box::new(renderer)), sink)
}

/// Terminal accepting a platform track, and the sink observing its frames.
pub fn track_renderer() -> (Terminal, FrameSink) {
    let (output, interactions, sink) = FrameSink::new();
    let renderer = TrackRenderer {
        lifecycle: Lifecycle::new(),
        output,
        interactions,
        playback: None,
    };
    (Terminal::new(PipeType::PlatformTrack, Box::new(renderer)), sink)
}
