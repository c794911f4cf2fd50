use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use streamrx_pipeline::{Capability, Environment, ExecutionContext, SessionParams, StageRegistry};
use streamrx_worker::WorkerFactory;

use crate::exit::{io_error, json_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod check;
pub mod loopback;
pub mod probe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print which built-in stages run in the main and worker contexts.
    Probe(ProbeArgs),
    /// Validate a pipeline description against a terminal renderer.
    Check(CheckArgs),
    /// Stream synthesized media through a local socket pair and render it.
    Loopback(LoopbackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Probe(args) => probe::run(args, format),
        Command::Check(args) => check::run(args, format),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Platform capability names accepted on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CapabilityArg {
    VideoDecoder,
    AudioDecoder,
    TrackGenerator,
    FrameRenderer,
    AudioOutput,
    WorkerMessaging,
}

impl From<CapabilityArg> for Capability {
    fn from(arg: CapabilityArg) -> Self {
        match arg {
            CapabilityArg::VideoDecoder => Capability::VideoDecoder,
            CapabilityArg::AudioDecoder => Capability::AudioDecoder,
            CapabilityArg::TrackGenerator => Capability::TrackGenerator,
            CapabilityArg::FrameRenderer => Capability::FrameRenderer,
            CapabilityArg::AudioOutput => Capability::AudioOutput,
            CapabilityArg::WorkerMessaging => Capability::WorkerMessaging,
        }
    }
}

/// Options describing the simulated environment.
#[derive(Args, Debug, Clone, Default)]
pub struct EnvironmentArgs {
    /// Capabilities to remove from both contexts (comma-separated).
    #[arg(long, value_enum, value_delimiter = ',', value_name = "CAPABILITY")]
    pub without: Vec<CapabilityArg>,
    /// Do not start a worker; every stage runs in the main context.
    #[arg(long)]
    pub no_worker: bool,
    /// How long to wait for each worker capability answer (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub worker_timeout: String,
}

impl EnvironmentArgs {
    pub fn environment(&self, context: ExecutionContext) -> Environment {
        restricted(context, &self.without)
    }

    /// Worker factory honouring `--without`.
    pub fn worker_factory(&self) -> WorkerFactory {
        let without = self.without.clone();
        Arc::new(move || {
            (
                StageRegistry::with_builtin_stages(),
                restricted(ExecutionContext::Worker, &without),
            )
        })
    }
}

fn restricted(context: ExecutionContext, without: &[CapabilityArg]) -> Environment {
    without
        .iter()
        .fold(Environment::full(context), |env, &capability| {
            env.without_capability(capability.into())
        })
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub env: EnvironmentArgs,
}

/// Terminal renderer a checked pipeline must end in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TerminalArg {
    /// Presents decoded frames.
    Frame,
    /// Plays a platform track.
    Track,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// JSON file holding the pipeline description.
    #[arg(conflicts_with = "pipes", required_unless_present = "pipes")]
    pub file: Option<PathBuf>,
    /// Inline pipeline description, e.g. '["Depacketize","Decode"]'.
    #[arg(long)]
    pub pipes: Option<String>,
    /// Terminal renderer the chain feeds.
    #[arg(long, value_enum, default_value = "track")]
    pub terminal: TerminalArg,
    /// Validate stage support with the capability probe.
    #[arg(long)]
    pub probe: bool,
    #[command(flatten)]
    pub env: EnvironmentArgs,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Video and audio frames to send.
    #[arg(long, default_value = "60")]
    pub frames: u32,
    /// Run audio depacketizing and decoding on a worker.
    #[arg(long)]
    pub offload_audio: bool,
    /// JSON file with session parameters (codecs, resolution, rates).
    #[arg(long, value_name = "FILE")]
    pub session: Option<PathBuf>,
    /// Give up waiting for rendered frames after this long (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))
}

pub fn load_session(path: Option<&Path>) -> CliResult<SessionParams> {
    let Some(path) = path else {
        return Ok(SessionParams::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("cannot read {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| json_error("invalid session file", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration(" ").is_err());
    }

    #[test]
    fn without_removes_capabilities() {
        let args = EnvironmentArgs {
            without: vec![CapabilityArg::VideoDecoder],
            ..EnvironmentArgs::default()
        };
        let env = args.environment(ExecutionContext::Main);
        assert!(!env.has(Capability::VideoDecoder));
        assert!(env.has(Capability::AudioDecoder));
        assert_eq!(env.context(), ExecutionContext::Main);
    }

    #[test]
    fn missing_session_file_uses_defaults() {
        assert_eq!(load_session(None).unwrap(), SessionParams::default());
        let err = load_session(Some(Path::new("/nonexistent/streamrx-session.json")))
            .unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
