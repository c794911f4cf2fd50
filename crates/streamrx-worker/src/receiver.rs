//! Worker side of the delegation channel.

use async_trait::async_trait;
use bytes::Bytes;
use streamrx_frame::{EncodedUnit, MediaFrame};
use streamrx_pipeline::{
    Environment, Lifecycle, PipeSpec, PipeType, Pipeline, PipelineBuilder, Result as PipelineResult,
    Stage, StageConfig, StageRegistry, Terminal,
};
use streamrx_transport::PlatformTrack;
use tokio::sync::mpsc;

use crate::error::WorkerError;
use crate::protocol::{LogLevel, Payload, WorkerEvent, WorkerRequest};

/// Terminal of a worker-side chain: sends everything it receives back to
/// the orchestrating context as `output` events.
pub struct WorkerOutput {
    lifecycle: Lifecycle,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerOutput {
    pub fn terminal(accepts: PipeType, events: mpsc::UnboundedSender<WorkerEvent>) -> Terminal {
        Terminal::new(
            accepts,
            Box::new(Self {
                lifecycle: Lifecycle::new(),
                events,
            }),
        )
    }

    fn emit(&self, payload: Payload) {
        if !self.lifecycle.accepts("WorkerOutput", payload.kind()) {
            return;
        }
        // A closed channel means the orchestrating side is gone.
        let _ = self.events.send(WorkerEvent::Output(payload));
    }
}

#[async_trait]
impl Stage for WorkerOutput {
    fn name(&self) -> &str {
        "WorkerOutput"
    }

    fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
        None
    }

    async fn setup(&mut self, _config: &StageConfig) -> PipelineResult<()> {
        if self.lifecycle.begin_setup() {
            self.lifecycle.finish_setup();
        }
        Ok(())
    }

    async fn cleanup(&mut self) {
        self.lifecycle.close();
    }

    async fn submit_packet(&mut self, packet: Bytes) {
        self.emit(Payload::Packet(packet));
    }

    async fn submit_unit(&mut self, unit: EncodedUnit) {
        self.emit(Payload::Unit(unit));
    }

    async fn submit_frame(&mut self, frame: MediaFrame) {
        self.emit(Payload::Frame(frame));
    }

    async fn submit_track(&mut self, track: PlatformTrack) {
        self.emit(Payload::Track(track));
    }
}

/// Handles requests inside the worker context.
///
/// Owns its own registry and environment; nothing is shared with the
/// orchestrating context.
pub struct WorkerReceiver {
    registry: StageRegistry,
    environment: Environment,
    events: mpsc::UnboundedSender<WorkerEvent>,
    pipes: Option<Vec<String>>,
    pipeline: Option<Pipeline>,
    build_error: Option<String>,
}

impl WorkerReceiver {
    pub fn new(
        registry: StageRegistry,
        environment: Environment,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            registry,
            environment,
            events,
            pipes: None,
            pipeline: None,
            build_error: None,
        }
    }

    /// Serve requests until the orchestrating side hangs up.
    pub async fn run(mut self, mut requests: mpsc::UnboundedReceiver<WorkerRequest>) {
        while let Some(request) = requests.recv().await {
            self.handle(request).await;
        }
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.cleanup().await;
        }
    }

    pub async fn handle(&mut self, request: WorkerRequest) {
        match request {
            WorkerRequest::CheckSupport { class_name } => {
                let supported = self
                    .registry
                    .get(&class_name)
                    .is_some_and(|descriptor| descriptor.supported_in(&self.environment));
                self.send(WorkerEvent::CheckSupport { supported });
            }
            WorkerRequest::CreatePipeline { pipes } => self.create_pipeline(pipes).await,
            WorkerRequest::Setup { config } => {
                let error = self.setup(&config).await.err();
                self.send(WorkerEvent::SetupDone { error });
            }
            WorkerRequest::Cleanup => {
                if let Some(pipeline) = self.pipeline.as_mut() {
                    pipeline.cleanup().await;
                }
            }
            WorkerRequest::UserInteraction => {
                if let Some(pipeline) = self.pipeline.as_mut() {
                    pipeline.on_user_interaction().await;
                }
            }
            WorkerRequest::Input(payload) => match self.pipeline.as_mut() {
                Some(pipeline) => submit(pipeline, payload).await,
                None => self.log(
                    LogLevel::Debug,
                    format!("dropping {} before createPipeline", payload.kind()),
                ),
            },
        }
    }

    async fn create_pipeline(&mut self, pipes: Vec<String>) {
        let live = self.pipeline.as_ref().is_some_and(|p| !p.is_closed());
        if live && self.pipes.as_ref() == Some(&pipes) {
            return;
        }
        if let Some(mut previous) = self.pipeline.take() {
            previous.cleanup().await;
        }

        let accepts = pipes
            .last()
            .and_then(|name| self.registry.get(name))
            .map(|descriptor| descriptor.output());
        let result = match accepts {
            Some(accepts) => {
                let specs: Vec<PipeSpec> = pipes.iter().map(PipeSpec::stage).collect();
                PipelineBuilder::new(&self.registry, &self.environment)
                    .build(WorkerOutput::terminal(accepts, self.events.clone()), &specs)
                    .map_err(WorkerError::from)
            }
            None => Err(WorkerError::Protocol(format!(
                "cannot resolve output of [{}]",
                pipes.join(", ")
            ))),
        };

        match result {
            Ok(pipeline) => {
                self.log(
                    LogLevel::Info,
                    format!("worker pipeline created: {}", pipeline.stage_names().join(" -> ")),
                );
                self.pipeline = Some(pipeline);
                self.build_error = None;
            }
            Err(err) => {
                self.log(LogLevel::Error, format!("createPipeline failed: {err}"));
                self.build_error = Some(err.to_string());
            }
        }
        self.pipes = Some(pipes);
    }

    async fn setup(&mut self, config: &StageConfig) -> Result<(), String> {
        match self.pipeline.as_mut() {
            Some(pipeline) => pipeline.setup(config).await.map_err(|err| err.to_string()),
            None => Err(self.build_error.clone().unwrap_or_else(|| {
                WorkerError::Protocol("setup before createPipeline".to_string()).to_string()
            })),
        }
    }

    fn log(&self, level: LogLevel, info: String) {
        self.send(WorkerEvent::Log { level, info });
    }

    fn send(&self, event: WorkerEvent) {
        let _ = self.events.send(event);
    }
}

async fn submit(pipeline: &mut Pipeline, payload: Payload) {
    match payload {
        Payload::Packet(packet) => pipeline.submit_packet(packet).await,
        Payload::Unit(unit) => pipeline.submit_unit(unit).await,
        Payload::Frame(frame) => pipeline.submit_frame(frame).await,
        Payload::Track(track) => pipeline.submit_track(track).await,
    }
}
