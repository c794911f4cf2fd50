use std::fmt;
use std::io;

use streamrx_frame::FrameError;
use streamrx_pipeline::PipelineError;
use streamrx_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const UNSUPPORTED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. }
        | FrameError::Truncated { .. }
        | FrameError::TimestampOverflow { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::Frame(err) => frame_error(context, err),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn pipeline_error(context: &str, err: PipelineError) -> CliError {
    let code = match err {
        PipelineError::UnknownStage(_)
        | PipelineError::IncompatibleChain { .. }
        | PipelineError::DuplicateStage(_) => DATA_INVALID,
        PipelineError::UnsupportedEnvironment { .. } | PipelineError::UnsupportedCodec { .. } => {
            UNSUPPORTED
        }
        PipelineError::SetupFailed { .. } | PipelineError::Cancelled => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn json_error(context: &str, err: serde_json::Error) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use streamrx_pipeline::{ExecutionContext, PipeType};

    use super::*;

    #[test]
    fn chain_errors_are_data_errors() {
        let err = pipeline_error(
            "check",
            PipelineError::IncompatibleChain {
                stage: "A".to_string(),
                output: PipeType::EncodedUnit,
                next: "C".to_string(),
                input: PipeType::MediaFrame,
            },
        );
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("check: incompatible chain"));
    }

    #[test]
    fn unsupported_stage_maps_to_unsupported() {
        let err = pipeline_error(
            "check",
            PipelineError::UnsupportedEnvironment {
                stage: "Decode".to_string(),
                context: ExecutionContext::Main,
            },
        );
        assert_eq!(err.code, UNSUPPORTED);
    }

    #[test]
    fn io_kinds_map_to_codes() {
        let err = io_error("read", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code, PERMISSION_DENIED);
        let err = transport_error(
            "connect",
            TransportError::Io(io::Error::from(io::ErrorKind::TimedOut)),
        );
        assert_eq!(err.code, TIMEOUT);
    }
}
