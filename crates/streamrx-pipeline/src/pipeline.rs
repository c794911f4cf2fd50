use bytes::Bytes;
use streamrx_frame::{EncodedUnit, MediaFrame};
use streamrx_transport::PlatformTrack;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{PipeType, StageConfig};
use crate::error::{PipelineError, Result};
use crate::stage::Stage;

/// Cancels a pipeline from outside, including while `setup` is pending.
#[derive(Debug, Clone)]
pub struct CleanupHandle {
    token: CancellationToken,
}

impl CleanupHandle {
    /// Request cleanup. The pipeline tears down at its next call, or
    /// immediately if `setup` is in progress.
    pub fn cleanup(&self) {
        self.token.cancel();
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A built chain of stages ending at a terminal renderer.
///
/// The stage list is fixed; reconfiguring means cleaning up and building a
/// new pipeline.
pub struct Pipeline {
    input: PipeType,
    names: Vec<String>,
    head: Box<dyn Stage>,
    token: CancellationToken,
    closed: bool,
}

impl Pipeline {
    pub(crate) fn new(
        input: PipeType,
        names: Vec<String>,
        head: Box<dyn Stage>,
        token: CancellationToken,
    ) -> Self {
        Self {
            input,
            names,
            head,
            token,
            closed: false,
        }
    }

    /// Type accepted by the first stage.
    pub fn input_type(&self) -> PipeType {
        self.input
    }

    /// Stage names from input to terminal.
    pub fn stage_names(&self) -> &[String] {
        &self.names
    }

    pub fn cleanup_handle(&self) -> CleanupHandle {
        CleanupHandle {
            token: self.token.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Set up every stage. Aborts with [`PipelineError::Cancelled`] if a
    /// cleanup is requested first.
    pub async fn setup(&mut self, config: &StageConfig) -> Result<()> {
        if self.ensure_live().await.is_none() {
            return Err(PipelineError::Cancelled);
        }
        let token = self.token.clone();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.head.setup(config) => Some(result),
        };
        match outcome {
            Some(Ok(())) => {
                info!(stages = ?self.names, "pipeline ready");
                Ok(())
            }
            Some(Err(err)) => Err(err),
            None => {
                debug!("cleanup requested during setup");
                self.cleanup().await;
                Err(PipelineError::Cancelled)
            }
        }
    }

    /// Tear down every stage. Idempotent.
    pub async fn cleanup(&mut self) {
        self.token.cancel();
        if self.closed {
            return;
        }
        self.closed = true;
        self.head.cleanup().await;
        info!(stages = ?self.names, "pipeline cleaned up");
    }

    pub async fn on_user_interaction(&mut self) {
        if self.ensure_live().await.is_some() {
            self.head.on_user_interaction().await;
        }
    }

    pub async fn submit_packet(&mut self, packet: Bytes) {
        if self.ensure_live().await.is_some() {
            self.head.submit_packet(packet).await;
        }
    }

    pub async fn submit_unit(&mut self, unit: EncodedUnit) {
        if self.ensure_live().await.is_some() {
            self.head.submit_unit(unit).await;
        }
    }

    pub async fn submit_frame(&mut self, frame: MediaFrame) {
        if self.ensure_live().await.is_some() {
            self.head.submit_frame(frame).await;
        }
    }

    pub async fn submit_track(&mut self, track: PlatformTrack) {
        if self.ensure_live().await.is_some() {
            self.head.submit_track(track).await;
        }
    }

    /// Finish a cleanup requested through a handle; `None` once closed.
    async fn ensure_live(&mut self) -> Option<()> {
        if self.token.is_cancelled() {
            self.cleanup().await;
        }
        (!self.closed).then_some(())
    }
}
