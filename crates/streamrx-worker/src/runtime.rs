use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use streamrx_pipeline::{Environment, ExecutionContext, StageRegistry};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{Result, WorkerError};
use crate::protocol::{WorkerEvent, WorkerRequest};
use crate::receiver::WorkerReceiver;

/// Builds the registry and environment a worker runs with. Called on the
/// worker thread.
pub type WorkerFactory = Arc<dyn Fn() -> (StageRegistry, Environment) + Send + Sync>;

/// Factory for a worker with the built-in stages and every capability.
pub fn default_factory() -> WorkerFactory {
    Arc::new(|| {
        (
            StageRegistry::with_builtin_stages(),
            Environment::full(ExecutionContext::Worker),
        )
    })
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long `check_support` waits for an answer before reporting the
    /// stage unsupported.
    pub check_support_timeout: Duration,
    /// Name of the worker OS thread.
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            check_support_timeout: Duration::from_secs(1),
            thread_name: "streamrx-worker".to_string(),
        }
    }
}

/// The orchestrating side's end of an ordered worker message channel.
pub struct WorkerLink {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerLink {
    /// Wrap an existing channel pair, e.g. one relayed through another task.
    pub fn new(
        requests: mpsc::UnboundedSender<WorkerRequest>,
        events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) -> Self {
        Self {
            requests,
            events,
            thread: None,
        }
    }

    /// Queue a request. Never waits on the worker.
    pub fn send(&self, request: WorkerRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| WorkerError::Unavailable)
    }

    /// Next event from the worker; `None` once it has exited.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Whether the worker thread (if this link owns one) is still running.
    pub fn is_alive(&self) -> bool {
        !self.requests.is_closed()
            && self
                .thread
                .as_ref()
                .is_none_or(|thread| !thread.is_finished())
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<WorkerRequest>,
        mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        (self.requests, self.events)
    }
}

impl fmt::Debug for WorkerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLink")
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Start a worker on its own OS thread with a current-thread runtime.
///
/// The worker exits when every request sender is dropped.
pub fn spawn_worker(factory: WorkerFactory, config: &WorkerConfig) -> Result<WorkerLink> {
    let (requests, request_rx) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let thread_name = config.thread_name.clone();

    let thread = std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    warn!(error = %err, "worker runtime failed to start");
                    return;
                }
            };
            let (registry, environment) = factory();
            runtime.block_on(WorkerReceiver::new(registry, environment, event_tx).run(request_rx));
        })?;

    info!(thread = %thread_name, "worker started");
    Ok(WorkerLink {
        requests,
        events,
        thread: Some(thread),
    })
}
