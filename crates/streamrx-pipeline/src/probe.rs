//! Capability probing.
//!
//! Probing never fails: unknown stages, missing capabilities and an
//! unreachable worker all come back as `false` or an empty codec list.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::ExecutionContext;
use crate::environment::Environment;
use crate::registry::StageRegistry;

/// Answers whether a stage can run in a worker context.
#[async_trait]
pub trait WorkerSupport: Send + Sync {
    /// `false` when the stage is unsupported or the worker is unreachable.
    async fn check_support(&self, stage: &str) -> bool;
}

/// Per-context support of one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSupport {
    pub main: bool,
    pub worker: bool,
}

/// Probe result for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    /// Usable in at least one context.
    pub environment_supported: bool,
    pub execution_environment: ExecutionSupport,
    /// Codecs the stage can handle; empty for codec-agnostic stages.
    pub supported_codecs: Vec<String>,
}

impl StageInfo {
    pub fn supports(&self, context: ExecutionContext) -> bool {
        match context {
            ExecutionContext::Main => self.execution_environment.main,
            ExecutionContext::Worker => self.execution_environment.worker,
        }
    }
}

/// Probe results keyed by stage name, consumed by the pipeline builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SupportTable {
    stages: BTreeMap<String, StageInfo>,
}

impl SupportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stage: impl Into<String>, info: StageInfo) {
        self.stages.insert(stage.into(), info);
    }

    pub fn get(&self, stage: &str) -> Option<&StageInfo> {
        self.stages.get(stage)
    }

    /// Missing entries count as unsupported.
    pub fn supports(&self, stage: &str, context: ExecutionContext) -> bool {
        self.get(stage).is_some_and(|info| info.supports(context))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageInfo)> {
        self.stages.iter().map(|(name, info)| (name.as_str(), info))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Probes registered stages against the local environment and, when one is
/// attached, a worker.
pub struct Probe<'a> {
    registry: &'a StageRegistry,
    environment: &'a Environment,
    worker: Option<&'a dyn WorkerSupport>,
}

impl<'a> Probe<'a> {
    pub fn new(registry: &'a StageRegistry, environment: &'a Environment) -> Self {
        Self {
            registry,
            environment,
            worker: None,
        }
    }

    pub fn with_worker(mut self, worker: &'a dyn WorkerSupport) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Probe one stage by name.
    pub async fn probe(&self, stage: &str) -> StageInfo {
        let Some(descriptor) = self.registry.get(stage) else {
            debug!(stage, "probing unregistered stage");
            return StageInfo::default();
        };

        let main = descriptor.supported_in(self.environment);
        let worker = match self.worker {
            Some(worker) if descriptor.allows(ExecutionContext::Worker) => {
                worker.check_support(stage).await
            }
            _ => false,
        };
        let supported_codecs = if descriptor.is_codec_aware() && (main || worker) {
            self.environment.codecs()
        } else {
            Vec::new()
        };

        debug!(stage, main, worker, "probed stage");
        StageInfo {
            environment_supported: main || worker,
            execution_environment: ExecutionSupport { main, worker },
            supported_codecs,
        }
    }

    /// Probe every registered stage.
    pub async fn probe_all(&self) -> SupportTable {
        let mut table = SupportTable::new();
        for name in self.registry.names() {
            table.insert(name, self.probe(name).await);
        }
        table
    }
}
