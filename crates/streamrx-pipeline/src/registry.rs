use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{Capability, ExecutionContext, PipeType};
use crate::environment::Environment;
use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use crate::stages::{Decode, Depacketize, TrackGenerate};

type StageFactory = Arc<dyn Fn(Box<dyn Stage>, &Environment) -> Box<dyn Stage> + Send + Sync>;

/// Type metadata and constructor of one named stage.
#[derive(Clone)]
pub struct StageDescriptor {
    name: String,
    input: PipeType,
    output: PipeType,
    contexts: Vec<ExecutionContext>,
    requirements: Vec<Capability>,
    codec_aware: bool,
    factory: StageFactory,
}

impl StageDescriptor {
    /// Describe a stage runnable in every context with no requirements.
    ///
    /// `factory` receives the stage's base and the environment of the
    /// context it is built in.
    pub fn new<F>(name: impl Into<String>, input: PipeType, output: PipeType, factory: F) -> Self
    where
        F: Fn(Box<dyn Stage>, &Environment) -> Box<dyn Stage> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            input,
            output,
            contexts: vec![ExecutionContext::Main, ExecutionContext::Worker],
            requirements: Vec::new(),
            codec_aware: false,
            factory: Arc::new(factory),
        }
    }

    /// Restrict the contexts the stage may run in.
    pub fn contexts(mut self, contexts: &[ExecutionContext]) -> Self {
        self.contexts = contexts.to_vec();
        self
    }

    pub fn requires(mut self, capability: Capability) -> Self {
        self.requirements.push(capability);
        self
    }

    /// Mark the stage as depending on the environment's codec set.
    pub fn codec_aware(mut self) -> Self {
        self.codec_aware = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type the stage accepts.
    pub fn input(&self) -> PipeType {
        self.input
    }

    /// Type the stage hands to its base.
    pub fn output(&self) -> PipeType {
        self.output
    }

    pub fn requirements(&self) -> &[Capability] {
        &self.requirements
    }

    pub fn is_codec_aware(&self) -> bool {
        self.codec_aware
    }

    pub fn allows(&self, context: ExecutionContext) -> bool {
        self.contexts.contains(&context)
    }

    /// Whether the stage can run in `environment` as described.
    pub fn supported_in(&self, environment: &Environment) -> bool {
        self.allows(environment.context())
            && environment.satisfies(&self.requirements)
            && (!self.codec_aware || !environment.codecs().is_empty())
    }

    /// Construct the stage around `base`.
    pub fn instantiate(&self, base: Box<dyn Stage>, environment: &Environment) -> Box<dyn Stage> {
        (self.factory)(base, environment)
    }
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("contexts", &self.contexts)
            .field("requirements", &self.requirements)
            .field("codec_aware", &self.codec_aware)
            .finish_non_exhaustive()
    }
}

/// Name-keyed table of stage descriptors.
///
/// Built once per session and passed by reference to the probe and the
/// builder.
#[derive(Debug, Default, Clone)]
pub struct StageRegistry {
    stages: BTreeMap<String, StageDescriptor>,
}

impl StageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in stages.
    pub fn with_builtin_stages() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_stages() {
            // Names below are distinct.
            let _ = registry.register(descriptor);
        }
        registry
    }

    /// Register a stage. Names are unique.
    pub fn register(&mut self, descriptor: StageDescriptor) -> Result<()> {
        if self.stages.contains_key(descriptor.name()) {
            return Err(PipelineError::DuplicateStage(descriptor.name));
        }
        self.stages.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.values()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

pub const DEPACKETIZE: &str = "Depacketize";
pub const DECODE: &str = "Decode";
pub const AUDIO_DECODE: &str = "AudioDecode";
pub const TRACK_GENERATE: &str = "TrackGenerate";

fn builtin_stages() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor::new(
            DEPACKETIZE,
            PipeType::RawBytes,
            PipeType::EncodedUnit,
            |base, _| Box::new(Depacketize::new(base)),
        ),
        StageDescriptor::new(
            DECODE,
            PipeType::EncodedUnit,
            PipeType::MediaFrame,
            |base, env| Box::new(Decode::new(DECODE, base, env.backend().clone())),
        )
        .requires(Capability::VideoDecoder)
        .codec_aware(),
        StageDescriptor::new(
            AUDIO_DECODE,
            PipeType::EncodedUnit,
            PipeType::MediaFrame,
            |base, env| Box::new(Decode::new(AUDIO_DECODE, base, env.backend().clone())),
        )
        .requires(Capability::AudioDecoder)
        .codec_aware(),
        // Track generation needs the main context's media stack.
        StageDescriptor::new(
            TRACK_GENERATE,
            PipeType::MediaFrame,
            PipeType::PlatformTrack,
            |base, _| Box::new(TrackGenerate::new(base)),
        )
        .contexts(&[ExecutionContext::Main])
        .requires(Capability::TrackGenerator),
    ]
}
