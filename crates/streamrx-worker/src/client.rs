use async_trait::async_trait;
use streamrx_pipeline::WorkerSupport;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::{emit_log, WorkerEvent, WorkerRequest};
use crate::runtime::{spawn_worker, WorkerConfig, WorkerFactory, WorkerLink};

/// Long-lived worker used to answer capability questions.
///
/// Any failure to talk to the worker counts as "not supported"; once the
/// worker has failed it is not asked again.
pub struct WorkerClient {
    link: Mutex<Option<WorkerLink>>,
    config: WorkerConfig,
}

impl WorkerClient {
    /// Start a worker. A failed start leaves the client unavailable.
    pub fn spawn(factory: WorkerFactory, config: WorkerConfig) -> Self {
        let link = match spawn_worker(factory, &config) {
            Ok(link) => Some(link),
            Err(err) => {
                warn!(error = %err, "worker unavailable, stages will run locally");
                None
            }
        };
        Self {
            link: Mutex::new(link),
            config,
        }
    }

    /// A client with no worker behind it.
    pub fn unavailable() -> Self {
        Self {
            link: Mutex::new(None),
            config: WorkerConfig::default(),
        }
    }

    pub fn from_link(link: WorkerLink, config: WorkerConfig) -> Self {
        Self {
            link: Mutex::new(Some(link)),
            config,
        }
    }

    pub async fn is_available(&self) -> bool {
        self.link.lock().await.is_some()
    }
}

#[async_trait]
impl WorkerSupport for WorkerClient {
    async fn check_support(&self, stage: &str) -> bool {
        let mut guard = self.link.lock().await;
        let Some(link) = guard.as_mut() else {
            return false;
        };
        let request = WorkerRequest::CheckSupport {
            class_name: stage.to_string(),
        };
        if link.send(request).is_err() {
            debug!(stage, "worker gone");
            *guard = None;
            return false;
        }

        let answer = tokio::time::timeout(self.config.check_support_timeout, async {
            loop {
                match link.next_event().await {
                    Some(WorkerEvent::CheckSupport { supported }) => return Some(supported),
                    Some(WorkerEvent::Log { level, info }) => emit_log(level, &info),
                    Some(other) => debug!(event = ?other, "ignoring worker event"),
                    None => return None,
                }
            }
        })
        .await;

        match answer {
            Ok(Some(supported)) => supported,
            Ok(None) => {
                warn!(stage, "worker exited during checkSupport");
                *guard = None;
                false
            }
            Err(_) => {
                warn!(
                    stage,
                    timeout_ms = self.config.check_support_timeout.as_millis() as u64,
                    "worker did not answer checkSupport"
                );
                *guard = None;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::runtime::default_factory;

    #[tokio::test]
    async fn unavailable_worker_supports_nothing() {
        let client = WorkerClient::unavailable();
        assert!(!client.check_support("Depacketize").await);
        assert!(!client.is_available().await);
    }

    #[tokio::test]
    async fn spawned_worker_reports_its_environment() {
        let client = WorkerClient::spawn(default_factory(), WorkerConfig::default());
        assert!(client.check_support("Decode").await);
        assert!(!client.check_support("TrackGenerate").await);
        assert!(!client.check_support("NoSuchStage").await);
        assert!(client.is_available().await);
    }

    #[tokio::test]
    async fn silent_worker_times_out() {
        let (requests, _request_rx) = mpsc::unbounded_channel();
        let (_event_tx, events) = mpsc::unbounded_channel();
        let config = WorkerConfig {
            check_support_timeout: Duration::from_millis(20),
            ..WorkerConfig::default()
        };
        let client = WorkerClient::from_link(WorkerLink::new(requests, events), config);

        assert!(!client.check_support("Decode").await);
        assert!(!client.is_available().await);
    }

    #[tokio::test]
    async fn exited_worker_supports_nothing() {
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel::<WorkerEvent>();
        drop(event_tx);
        let client =
            WorkerClient::from_link(WorkerLink::new(requests, events), WorkerConfig::default());

        assert!(!client.check_support("Decode").await);
        drop(request_rx);
    }
}
