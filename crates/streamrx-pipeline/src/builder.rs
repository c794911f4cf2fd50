//! Resolves a declarative stage list into a pipeline.
//!
//! The list is validated end to end before the first stage is constructed,
//! so a failed build never leaves a partial chain behind.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ExecutionContext, PipeSpec, PipeType};
use crate::environment::Environment;
use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::probe::SupportTable;
use crate::registry::{StageDescriptor, StageRegistry};
use crate::stage::Stage;

/// Name reported for a worker boundary, in errors and in `Worker(..)` stage names.
pub const WORKER_STAGE: &str = "Worker";

/// The renderer a chain ends in, and the type it accepts.
pub struct Terminal {
    accepts: PipeType,
    stage: Box<dyn Stage>,
}

impl Terminal {
    pub fn new(accepts: PipeType, stage: Box<dyn Stage>) -> Self {
        Self { accepts, stage }
    }

    pub fn accepts(&self) -> PipeType {
        self.accepts
    }

    pub fn name(&self) -> &str {
        self.stage.name()
    }
}

/// Runs part of a chain in another execution context.
pub trait Offload: Send + Sync {
    /// Build the stage standing in for `pipes`, delivering their output to
    /// `base`.
    fn offload(&self, pipes: &[String], base: Box<dyn Stage>) -> Box<dyn Stage>;
}

enum Step<'r> {
    Local(&'r StageDescriptor),
    Remote(Vec<String>),
}

/// Builds pipelines from a registry, an environment and optional probe
/// results.
pub struct PipelineBuilder<'a> {
    registry: &'a StageRegistry,
    environment: &'a Environment,
    support: Option<&'a SupportTable>,
    offload: Option<Arc<dyn Offload>>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(registry: &'a StageRegistry, environment: &'a Environment) -> Self {
        Self {
            registry,
            environment,
            support: None,
            offload: None,
        }
    }

    /// Check stage support against probe results instead of the local
    /// environment.
    pub fn with_support(mut self, support: &'a SupportTable) -> Self {
        self.support = Some(support);
        self
    }

    /// Enable worker boundaries in stage lists.
    pub fn with_offload(mut self, offload: Arc<dyn Offload>) -> Self {
        self.offload = Some(offload);
        self
    }

    /// Build `specs` (listed from input to terminal) in front of `terminal`.
    ///
    /// Plain stage entries run in the environment's own context; entries
    /// inside a worker boundary run in the worker context.
    pub fn build(&self, terminal: Terminal, specs: &[PipeSpec]) -> Result<Pipeline> {
        let local = self.environment.context();
        let mut expected = terminal.accepts;
        let mut next = terminal.name().to_string();
        let mut steps = Vec::with_capacity(specs.len());

        for spec in specs.iter().rev() {
            match spec {
                PipeSpec::Stage(name) => {
                    let descriptor = self.resolve(name, local, expected, &next)?;
                    expected = descriptor.input();
                    next = name.clone();
                    steps.push(Step::Local(descriptor));
                }
                PipeSpec::Worker { worker } => {
                    if self.offload.is_none() {
                        return Err(PipelineError::UnsupportedEnvironment {
                            stage: WORKER_STAGE.to_string(),
                            context: ExecutionContext::Worker,
                        });
                    }
                    if worker.pipes.is_empty() {
                        debug!("skipping empty worker boundary");
                        continue;
                    }
                    for name in worker.pipes.iter().rev() {
                        let descriptor =
                            self.resolve(name, ExecutionContext::Worker, expected, &next)?;
                        expected = descriptor.input();
                        next = name.clone();
                    }
                    steps.push(Step::Remote(worker.pipes.clone()));
                }
            }
        }

        // Validation passed; construct innermost first.
        let mut names = vec![terminal.name().to_string()];
        let mut head = terminal.stage;
        for step in steps {
            head = match step {
                Step::Local(descriptor) => {
                    names.push(descriptor.name().to_string());
                    descriptor.instantiate(head, self.environment)
                }
                Step::Remote(pipes) => {
                    names.push(format!("{WORKER_STAGE}({})", pipes.join(", ")));
                    match &self.offload {
                        Some(offload) => offload.offload(&pipes, head),
                        None => head,
                    }
                }
            };
        }
        names.reverse();

        info!(stages = ?names, input = %expected, "pipeline built");
        Ok(Pipeline::new(expected, names, head, CancellationToken::new()))
    }

    fn resolve(
        &self,
        name: &str,
        context: ExecutionContext,
        expected: PipeType,
        next: &str,
    ) -> Result<&'a StageDescriptor> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| PipelineError::UnknownStage(name.to_string()))?;
        if descriptor.output() != expected {
            return Err(PipelineError::IncompatibleChain {
                stage: name.to_string(),
                output: descriptor.output(),
                next: next.to_string(),
                input: expected,
            });
        }
        if !self.supported(descriptor, context) {
            return Err(PipelineError::UnsupportedEnvironment {
                stage: name.to_string(),
                context,
            });
        }
        Ok(descriptor)
    }

    fn supported(&self, descriptor: &StageDescriptor, context: ExecutionContext) -> bool {
        if !descriptor.allows(context) {
            return false;
        }
        match self.support {
            Some(table) => table.supports(descriptor.name(), context),
            None if context == self.environment.context() => {
                descriptor.supported_in(self.environment)
            }
            // The remote side checks its own environment when it builds the run.
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::Capability;
    use crate::probe::{ExecutionSupport, StageInfo};
    use crate::registry::{DECODE, DEPACKETIZE, TRACK_GENERATE};
    use crate::stages::{frame_renderer, track_renderer};

    fn specs(names: &[&str]) -> Vec<PipeSpec> {
        names.iter().map(|name| PipeSpec::stage(*name)).collect()
    }

    fn expect_err(result: Result<Pipeline>) -> PipelineError {
        match result {
            Ok(pipeline) => panic!("expected build failure, got {:?}", pipeline.stage_names()),
            Err(err) => err,
        }
    }

    /// Registry whose stages count constructions.
    fn counting_registry(built: &Arc<AtomicUsize>) -> StageRegistry {
        let mut registry = StageRegistry::new();
        for (name, input, output) in [
            ("A", PipeType::RawBytes, PipeType::EncodedUnit),
            ("B", PipeType::EncodedUnit, PipeType::MediaFrame),
            ("C", PipeType::MediaFrame, PipeType::PlatformTrack),
        ] {
            let built = Arc::clone(built);
            registry
                .register(StageDescriptor::new(name, input, output, move |base, _| {
                    built.fetch_add(1, Ordering::SeqCst);
                    base
                }))
                .unwrap();
        }
        registry
    }

    #[test]
    fn matching_chain_preserves_input_order() {
        let registry = StageRegistry::with_builtin_stages();
        let env = Environment::full(ExecutionContext::Main);
        let (terminal, _sink) = track_renderer();

        let pipeline = PipelineBuilder::new(&registry, &env)
            .build(terminal, &specs(&[DEPACKETIZE, DECODE, TRACK_GENERATE]))
            .unwrap();

        assert_eq!(pipeline.input_type(), PipeType::RawBytes);
        assert_eq!(
            pipeline.stage_names(),
            [DEPACKETIZE, DECODE, TRACK_GENERATE, "TrackRenderer"]
        );
    }

    #[test]
    fn every_matching_sublist_builds() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(&built);
        let env = Environment::full(ExecutionContext::Main);
        let chains: [(&[&str], PipeType); 4] = [
            (&["A", "B", "C"], PipeType::PlatformTrack),
            (&["B", "C"], PipeType::PlatformTrack),
            (&["A", "B"], PipeType::MediaFrame),
            (&["A"], PipeType::EncodedUnit),
        ];
        for (names, terminal_type) in chains {
            let (terminal, _sink) = frame_renderer();
            let terminal = Terminal::new(terminal_type, terminal.stage);
            let pipeline = PipelineBuilder::new(&registry, &env)
                .build(terminal, &specs(names))
                .unwrap();
            let built_names: Vec<&str> =
                pipeline.stage_names().iter().map(String::as_str).collect();
            assert_eq!(&built_names[..names.len()], names);
        }
        assert_eq!(built.load(Ordering::SeqCst), 3 + 2 + 2 + 1);
    }

    #[test]
    fn mismatched_pair_names_both_stages_and_builds_nothing() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(&built);
        let env = Environment::full(ExecutionContext::Main);
        let (terminal, _sink) = frame_renderer();
        let terminal = Terminal::new(PipeType::PlatformTrack, terminal.stage);

        let err = expect_err(
            PipelineBuilder::new(&registry, &env).build(terminal, &specs(&["A", "C"])),
        );
        match err {
            PipelineError::IncompatibleChain {
                stage,
                output,
                next,
                input,
            } => {
                assert_eq!(stage, "A");
                assert_eq!(output, PipeType::EncodedUnit);
                assert_eq!(next, "C");
                assert_eq!(input, PipeType::MediaFrame);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn last_stage_must_match_terminal() {
        let registry = StageRegistry::with_builtin_stages();
        let env = Environment::full(ExecutionContext::Main);
        let (terminal, _sink) = frame_renderer();
        let err = expect_err(
            PipelineBuilder::new(&registry, &env).build(terminal, &specs(&[TRACK_GENERATE])),
        );
        assert!(matches!(
            err,
            PipelineError::IncompatibleChain { ref stage, ref next, .. }
                if stage == TRACK_GENERATE && next == "FrameRenderer"
        ));
    }

    #[test]
    fn unknown_stage_fails() {
        let registry = StageRegistry::with_builtin_stages();
        let env = Environment::full(ExecutionContext::Main);
        let (terminal, _sink) = frame_renderer();
        let err = expect_err(
            PipelineBuilder::new(&registry, &env).build(terminal, &specs(&["Upscale"])),
        );
        assert!(matches!(err, PipelineError::UnknownStage(name) if name == "Upscale"));
    }

    #[test]
    fn empty_list_takes_terminal_type() {
        let registry = StageRegistry::with_builtin_stages();
        let env = Environment::full(ExecutionContext::Main);
        let (terminal, _sink) = track_renderer();
        let pipeline = PipelineBuilder::new(&registry, &env)
            .build(terminal, &[])
            .unwrap();
        assert_eq!(pipeline.input_type(), PipeType::PlatformTrack);
        assert_eq!(pipeline.stage_names(), ["TrackRenderer"]);
    }

    #[test]
    fn unsupported_decode_is_named() {
        let registry = StageRegistry::with_builtin_stages();
        let chain = specs(&[DEPACKETIZE, DECODE, TRACK_GENERATE]);

        // Through the environment.
        let env =
            Environment::full(ExecutionContext::Main).without_capability(Capability::VideoDecoder);
        let (terminal, _sink) = track_renderer();
        let err = expect_err(PipelineBuilder::new(&registry, &env).build(terminal, &chain));
        assert!(matches!(
            err,
            PipelineError::UnsupportedEnvironment { ref stage, context: ExecutionContext::Main }
                if stage == DECODE
        ));

        // Through probe results.
        let env = Environment::full(ExecutionContext::Main);
        let mut table = SupportTable::new();
        let supported = StageInfo {
            environment_supported: true,
            execution_environment: ExecutionSupport {
                main: true,
                worker: false,
            },
            supported_codecs: Vec::new(),
        };
        table.insert(DEPACKETIZE, supported.clone());
        table.insert(TRACK_GENERATE, supported);
        table.insert(DECODE, StageInfo::default());
        let (terminal, _sink) = track_renderer();
        let err = expect_err(
            PipelineBuilder::new(&registry, &env)
                .with_support(&table)
                .build(terminal, &chain),
        );
        assert!(matches!(
            err,
            PipelineError::UnsupportedEnvironment { ref stage, .. } if stage == DECODE
        ));
    }

    #[test]
    fn worker_boundary_without_offload_names_worker() {
        let registry = StageRegistry::with_builtin_stages();
        let env = Environment::full(ExecutionContext::Main);
        let (terminal, _sink) = frame_renderer();
        let err = expect_err(PipelineBuilder::new(&registry, &env).build(
            terminal,
            &[PipeSpec::stage(DEPACKETIZE), PipeSpec::worker([DECODE])],
        ));
        match err {
            PipelineError::UnsupportedEnvironment { stage, context } => {
                assert_eq!(stage, "Worker");
                assert_eq!(context, ExecutionContext::Worker);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct InlineOffload {
        registry: StageRegistry,
        environment: Environment,
    }

    impl Offload for InlineOffload {
        fn offload(&self, pipes: &[String], mut base: Box<dyn Stage>) -> Box<dyn Stage> {
            for name in pipes.iter().rev() {
                if let Some(descriptor) = self.registry.get(name) {
                    base = descriptor.instantiate(base, &self.environment);
                }
            }
            base
        }
    }

    #[test]
    fn worker_runs_must_allow_worker_context() {
        let registry = StageRegistry::with_builtin_stages();
        let env = Environment::full(ExecutionContext::Main);
        let offload = Arc::new(InlineOffload {
            registry: registry.clone(),
            environment: Environment::full(ExecutionContext::Worker),
        });

        let (terminal, _sink) = track_renderer();
        let err = expect_err(
            PipelineBuilder::new(&registry, &env)
                .with_offload(offload.clone())
                .build(terminal, &[PipeSpec::worker([DEPACKETIZE, DECODE, TRACK_GENERATE])]),
        );
        assert!(matches!(
            err,
            PipelineError::UnsupportedEnvironment { ref stage, context: ExecutionContext::Worker }
                if stage == TRACK_GENERATE
        ));

        let (terminal, _sink) = track_renderer();
        let pipeline = PipelineBuilder::new(&registry, &env)
            .with_offload(offload)
            .build(
                terminal,
                &[PipeSpec::worker([DEPACKETIZE, DECODE]), PipeSpec::stage(TRACK_GENERATE)],
            )
            .unwrap();
        assert_eq!(
            pipeline.stage_names(),
            ["Worker(Depacketize, Decode)", TRACK_GENERATE, "TrackRenderer"]
        );
        assert_eq!(pipeline.input_type(), PipeType::RawBytes);
    }
}
