//! Orchestrating side of the delegation channel.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use streamrx_frame::{EncodedUnit, MediaFrame};
use streamrx_pipeline::{
    Lifecycle, Offload, PipelineError, Result as PipelineResult, Stage, StageConfig, WORKER_STAGE,
};
use streamrx_transport::PlatformTrack;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{emit_log, Payload, WorkerEvent, WorkerRequest};
use crate::runtime::{default_factory, spawn_worker, WorkerConfig, WorkerFactory, WorkerLink};

/// Opens a fresh link to a worker for one offloaded run.
pub type Connector = Arc<dyn Fn() -> Result<WorkerLink> + Send + Sync>;

enum Command {
    UserInteraction,
    Cleanup(oneshot::Sender<()>),
}

/// Stage standing in for a run of stages executed by a worker.
///
/// The worker is reached lazily on first `setup`: `createPipeline` is queued
/// before `setup`, and inputs follow in call order. Outputs coming back are
/// submitted to this stage's base by a task on the orchestrating runtime.
pub struct WorkerSender {
    pipes: Vec<String>,
    connector: Connector,
    lifecycle: Lifecycle,
    base: Option<Box<dyn Stage>>,
    requests: Option<mpsc::UnboundedSender<WorkerRequest>>,
    events: Option<mpsc::UnboundedReceiver<WorkerEvent>>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    pump: Option<JoinHandle<()>>,
}

impl WorkerSender {
    pub fn new(pipes: Vec<String>, base: Box<dyn Stage>, connector: Connector) -> Self {
        Self {
            pipes,
            connector,
            lifecycle: Lifecycle::new(),
            base: Some(base),
            requests: None,
            events: None,
            commands: None,
            pump: None,
        }
    }

    fn setup_failed(reason: impl Into<String>) -> PipelineError {
        PipelineError::SetupFailed {
            stage: WORKER_STAGE.to_string(),
            reason: reason.into(),
        }
    }

    fn connect(&mut self) -> PipelineResult<()> {
        if self.requests.is_some() {
            return Ok(());
        }
        let link = (self.connector)().map_err(|err| Self::setup_failed(err.to_string()))?;
        let (requests, events) = link.into_parts();
        requests
            .send(WorkerRequest::CreatePipeline {
                pipes: self.pipes.clone(),
            })
            .map_err(|_| Self::setup_failed("worker unavailable"))?;
        self.requests = Some(requests);
        self.events = Some(events);
        Ok(())
    }

    fn send(&self, request: WorkerRequest) {
        let Some(requests) = &self.requests else {
            return;
        };
        if let Err(err) = requests.send(request) {
            debug!(request = ?err.0, "worker gone, dropping request");
        }
    }

    fn forward(&self, payload: Payload) {
        if self.lifecycle.accepts(WORKER_STAGE, payload.kind()) {
            self.send(WorkerRequest::Input(payload));
        }
    }

    /// Wait for the worker's setup answer, delivering anything else it
    /// sends meanwhile.
    async fn await_setup_done(&mut self) -> PipelineResult<()> {
        let (Some(events), Some(base)) = (self.events.as_mut(), self.base.as_mut()) else {
            return Err(Self::setup_failed("worker not connected"));
        };
        loop {
            match events.recv().await {
                Some(WorkerEvent::SetupDone { error: None }) => return Ok(()),
                Some(WorkerEvent::SetupDone {
                    error: Some(reason),
                }) => return Err(Self::setup_failed(reason)),
                Some(event) => handle_event(base.as_mut(), event).await,
                None => return Err(Self::setup_failed("worker exited during setup")),
            }
        }
    }

    fn start_pump(&mut self) {
        let (Some(base), Some(events)) = (self.base.take(), self.events.take()) else {
            return;
        };
        let (commands, command_rx) = mpsc::unbounded_channel();
        self.commands = Some(commands);
        self.pump = Some(tokio::spawn(pump(base, events, command_rx)));
    }
}

#[async_trait]
impl Stage for WorkerSender {
    fn name(&self) -> &str {
        WORKER_STAGE
    }

    fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
        self.base.as_deref_mut()
    }

    async fn setup(&mut self, config: &StageConfig) -> PipelineResult<()> {
        if self.lifecycle.is_ready() {
            debug!("worker run already set up");
            return Ok(());
        }
        if !self.lifecycle.begin_setup() {
            return Ok(());
        }
        self.connect()?;
        self.send(WorkerRequest::Setup {
            config: config.clone(),
        });
        if let Some(base) = self.base.as_mut() {
            base.setup(config).await?;
        }
        self.await_setup_done().await?;
        self.start_pump();
        self.lifecycle.finish_setup();
        info!(pipes = ?self.pipes, "worker run ready");
        Ok(())
    }

    async fn cleanup(&mut self) {
        if !self.lifecycle.close() {
            return;
        }
        self.send(WorkerRequest::Cleanup);
        // Dropping the last request sender lets the worker exit.
        self.requests = None;
        self.events = None;

        if let Some(commands) = self.commands.take() {
            let (done, acked) = oneshot::channel();
            if commands.send(Command::Cleanup(done)).is_ok() {
                let _ = acked.await;
            }
        } else if let Some(base) = self.base.as_mut() {
            base.cleanup().await;
        }
        self.pump = None;
        debug!(pipes = ?self.pipes, "worker run cleaned up");
    }

    async fn on_user_interaction(&mut self) {
        self.send(WorkerRequest::UserInteraction);
        if let Some(commands) = &self.commands {
            let _ = commands.send(Command::UserInteraction);
        } else if let Some(base) = self.base.as_mut() {
            base.on_user_interaction().await;
        }
    }

    async fn submit_packet(&mut self, packet: Bytes) {
        self.forward(Payload::Packet(packet));
    }

    async fn submit_unit(&mut self, unit: EncodedUnit) {
        self.forward(Payload::Unit(unit));
    }

    async fn submit_frame(&mut self, frame: MediaFrame) {
        self.forward(Payload::Frame(frame));
    }

    async fn submit_track(&mut self, track: PlatformTrack) {
        self.forward(Payload::Track(track));
    }
}

async fn handle_event(base: &mut dyn Stage, event: WorkerEvent) {
    match event {
        WorkerEvent::Output(payload) => payload.submit_to(base).await,
        WorkerEvent::Log { level, info } => emit_log(level, &info),
        WorkerEvent::SetupDone { error: Some(reason) } => {
            warn!(%reason, "late worker setup failure");
        }
        WorkerEvent::SetupDone { error: None } | WorkerEvent::CheckSupport { .. } => {}
    }
}

async fn pump(
    mut base: Box<dyn Stage>,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut events_open = true;
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::UserInteraction) => base.on_user_interaction().await,
                Some(Command::Cleanup(done)) => {
                    base.cleanup().await;
                    let _ = done.send(());
                    return;
                }
                None => {
                    base.cleanup().await;
                    return;
                }
            },
            event = events.recv(), if events_open => match event {
                Some(event) => handle_event(base.as_mut(), event).await,
                None => {
                    debug!("worker event channel closed");
                    events_open = false;
                }
            },
        }
    }
}

/// [`Offload`] running each worker boundary on its own worker.
pub struct WorkerOffload {
    connector: Connector,
}

impl WorkerOffload {
    /// Spawn a worker thread per offloaded run.
    pub fn new(factory: WorkerFactory, config: WorkerConfig) -> Self {
        Self::with_connector(Arc::new(move || spawn_worker(factory.clone(), &config)))
    }

    /// Open links with a custom connector.
    pub fn with_connector(connector: Connector) -> Self {
        Self { connector }
    }
}

impl Default for WorkerOffload {
    fn default() -> Self {
        Self::new(default_factory(), WorkerConfig::default())
    }
}

impl Offload for WorkerOffload {
    fn offload(&self, pipes: &[String], base: Box<dyn Stage>) -> Box<dyn Stage> {
        Box::new(WorkerSender::new(
            pipes.to_vec(),
            base,
            Arc::clone(&self.connector),
        ))
    }
}
