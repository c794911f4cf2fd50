//! Adaptive media pipelines for streamrx.
//!
//! A pipeline is described as plain data, a list of [`PipeSpec`] entries
//! naming registered stages, and resolved by [`PipelineBuilder`] into a
//! chain ending at a terminal renderer. Stage support in the local and the
//! worker context is discovered with [`Probe`].
//!
//! ```no_run
//! use streamrx_pipeline::{
//!     track_renderer, Environment, ExecutionContext, PipeSpec, PipelineBuilder, SessionParams,
//!     StageConfig, StageRegistry,
//! };
//!
//! # async fn run() -> streamrx_pipeline::Result<()> {
//! let registry = StageRegistry::with_builtin_stages();
//! let environment = Environment::full(ExecutionContext::Main);
//! let (terminal, _frames) = track_renderer();
//! let specs = ["Depacketize", "Decode", "TrackGenerate"].map(PipeSpec::stage);
//! let mut pipeline = PipelineBuilder::new(&registry, &environment).build(terminal, &specs)?;
//! pipeline.setup(&StageConfig::video(SessionParams::default())).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod environment;
pub mod error;
pub mod pipeline;
pub mod probe;
pub mod registry;
pub mod stage;
pub mod stages;

pub use builder::{Offload, PipelineBuilder, Terminal, WORKER_STAGE};
pub use config::{
    Capability, ExecutionContext, PipeSpec, PipeType, SessionParams, StageConfig, WorkerPipes,
};
pub use environment::{CodecBackend, Decoder, Environment, PassthroughCodec};
pub use error::{PipelineError, Result};
pub use pipeline::{CleanupHandle, Pipeline};
pub use probe::{ExecutionSupport, Probe, StageInfo, SupportTable, WorkerSupport};
pub use registry::{
    StageDescriptor, StageRegistry, AUDIO_DECODE, DECODE, DEPACKETIZE, TRACK_GENERATE,
};
pub use stage::{Lifecycle, LifecycleState, Stage};
pub use stages::{frame_renderer, track_renderer, FrameSink};
