//! The contract every pipeline stage satisfies.
//!
//! A stage wraps the next stage towards the terminal renderer (its *base*).
//! Every method a stage does not override forwards, with the same
//! arguments, to the base's method of the same name. At the end of the
//! chain the call is a silent no-op.

use async_trait::async_trait;
use bytes::Bytes;
use streamrx_frame::{EncodedUnit, MediaFrame};
use streamrx_transport::PlatformTrack;
use tracing::debug;

use crate::config::StageConfig;
use crate::error::Result;

#[async_trait]
pub trait Stage: Send {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// The next stage, or `None` at the terminal renderer.
    fn base(&mut self) -> Option<&mut (dyn Stage + 'static)>;

    /// Configure the stage. May suspend while a decoder or renderer starts.
    async fn setup(&mut self, config: &StageConfig) -> Result<()> {
        match self.base() {
            Some(base) => base.setup(config).await,
            None => Ok(()),
        }
    }

    /// Release resources. Idempotent and infallible.
    async fn cleanup(&mut self) {
        if let Some(base) = self.base() {
            base.cleanup().await;
        }
    }

    /// Propagate a user gesture, e.g. to unlock audio playback.
    async fn on_user_interaction(&mut self) {
        if let Some(base) = self.base() {
            base.on_user_interaction().await;
        }
    }

    /// Accept raw bytes from a channel.
    async fn submit_packet(&mut self, packet: Bytes) {
        if let Some(base) = self.base() {
            base.submit_packet(packet).await;
        }
    }

    /// Accept one compressed unit.
    async fn submit_unit(&mut self, unit: EncodedUnit) {
        if let Some(base) = self.base() {
            base.submit_unit(unit).await;
        }
    }

    /// Accept one decoded frame.
    async fn submit_frame(&mut self, frame: MediaFrame) {
        if let Some(base) = self.base() {
            base.submit_frame(frame).await;
        }
    }

    /// Accept a platform track.
    async fn submit_track(&mut self, track: PlatformTrack) {
        if let Some(base) = self.base() {
            base.submit_track(track).await;
        }
    }
}

/// Setup progress of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    SettingUp,
    Ready,
    Closed,
}

/// Tracks a stage through `Idle -> SettingUp -> Ready -> Closed`.
///
/// `Closed` is terminal: once cleaned up a stage never becomes ready again.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.state == LifecycleState::Closed
    }

    /// Enter `SettingUp`. Returns false if the stage is already closed.
    pub fn begin_setup(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = LifecycleState::SettingUp;
        true
    }

    /// Enter `Ready`. Returns false if the stage was closed meanwhile.
    pub fn finish_setup(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = LifecycleState::Ready;
        true
    }

    /// Enter `Closed`. Returns true only for the first call.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = LifecycleState::Closed;
        true
    }

    /// Whether data may flow, logging the drop when it may not.
    pub fn accepts(&self, stage: &str, what: &'static str) -> bool {
        if self.is_ready() {
            return true;
        }
        debug!(stage, what, state = ?self.state, "dropping data outside ready state");
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use streamrx_frame::MediaKind;

    use super::*;
    use crate::config::SessionParams;

    /// Records calls, optionally overriding only `submit_frame`.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        base: Option<Box<dyn Stage>>,
    }

    #[async_trait]
    impl Stage for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
            self.base.as_deref_mut()
        }

        async fn submit_frame(&mut self, frame: MediaFrame) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, frame.timestamp_us));
        }
    }

    /// Overrides nothing.
    struct Passthrough {
        base: Box<dyn Stage>,
    }

    impl Stage for Passthrough {
        fn name(&self) -> &str {
            "passthrough"
        }

        fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
            Some(self.base.as_mut())
        }
    }

    #[tokio::test]
    async fn unimplemented_methods_forward_to_base() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal = Recorder {
            name: "terminal",
            log: Arc::clone(&log),
            base: None,
        };
        let mut chain = Passthrough {
            base: Box::new(Passthrough {
                base: Box::new(terminal),
            }),
        };

        chain
            .setup(&StageConfig::video(SessionParams::default()))
            .await
            .unwrap();
        chain
            .submit_frame(MediaFrame::new(MediaKind::Video, 42, 0, Bytes::new()))
            .await;
        // Not handled anywhere in the chain: silent no-op.
        chain.submit_packet(Bytes::from_static(b"x")).await;
        chain.cleanup().await;

        assert_eq!(*log.lock().unwrap(), vec!["terminal:42".to_string()]);
    }

    #[test]
    fn lifecycle_close_is_terminal() {
        let mut lifecycle = Lifecycle::new();
        assert!(!lifecycle.accepts("test", "frame"));
        assert!(lifecycle.begin_setup());
        assert!(lifecycle.finish_setup());
        assert!(lifecycle.accepts("test", "frame"));

        assert!(lifecycle.close());
        assert!(!lifecycle.close());
        assert!(!lifecycle.begin_setup());
        assert!(!lifecycle.finish_setup());
        assert_eq!(lifecycle.state(), LifecycleState::Closed);
    }
}
