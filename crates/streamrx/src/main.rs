mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "streamrx", version, about = "Remote-rendering session receiver")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "STREAMRX_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{CapabilityArg, TerminalArg};

    #[test]
    fn parses_check_with_inline_pipes() {
        let cli = Cli::try_parse_from([
            "streamrx",
            "check",
            "--pipes",
            r#"["Depacketize","Decode"]"#,
            "--terminal",
            "frame",
            "--without",
            "video-decoder,track-generator",
        ])
        .expect("check args should parse");

        match cli.command {
            Command::Check(args) => {
                assert_eq!(args.terminal, TerminalArg::Frame);
                assert_eq!(
                    args.env.without,
                    vec![CapabilityArg::VideoDecoder, CapabilityArg::TrackGenerator]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn check_requires_a_description() {
        let err = Cli::try_parse_from(["streamrx", "check"]).expect_err("missing input");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_file_and_inline_pipes_together() {
        let err = Cli::try_parse_from(["streamrx", "check", "chain.json", "--pipes", "[]"])
            .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_loopback_flags() {
        let cli = Cli::try_parse_from([
            "streamrx",
            "--format",
            "json",
            "loopback",
            "--frames",
            "12",
            "--offload-audio",
        ])
        .expect("loopback args should parse");
        match cli.command {
            Command::Loopback(args) => {
                assert_eq!(args.frames, 12);
                assert!(args.offload_audio);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
