use crate::config::{ExecutionContext, PipeType};

/// Errors raised while assembling or running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No stage is registered under this name.
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    /// Two adjacent stages disagree on the type flowing between them.
    #[error("incompatible chain: {stage} outputs {output} but {next} accepts {input}")]
    IncompatibleChain {
        stage: String,
        output: PipeType,
        next: String,
        input: PipeType,
    },

    /// The stage cannot run in the execution context of its run.
    #[error("stage {stage} is not supported in the {context} context")]
    UnsupportedEnvironment {
        stage: String,
        context: ExecutionContext,
    },

    /// A stage name was registered twice.
    #[error("stage already registered: {0}")]
    DuplicateStage(String),

    /// A stage failed to configure itself.
    #[error("setup of {stage} failed: {reason}")]
    SetupFailed { stage: String, reason: String },

    /// The pipeline was cleaned up while an operation was pending.
    #[error("pipeline cancelled")]
    Cancelled,

    /// None of the requested codecs is available.
    #[error("no supported codec among [{}]", requested.join(", "))]
    UnsupportedCodec { requested: Vec<String> },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
