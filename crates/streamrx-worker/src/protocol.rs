use bytes::Bytes;
use serde::{Deserialize, Serialize};
use streamrx_frame::{EncodedUnit, MediaFrame};
use streamrx_pipeline::{Stage, StageConfig};
use streamrx_transport::PlatformTrack;
use tracing::{debug, error, info, warn};

/// Data moved across the worker boundary.
///
/// Sending a payload moves it; the sending side keeps nothing.
#[derive(Debug)]
pub enum Payload {
    Packet(Bytes),
    Unit(EncodedUnit),
    Frame(MediaFrame),
    Track(PlatformTrack),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Packet(_) => "packet",
            Payload::Unit(_) => "unit",
            Payload::Frame(_) => "frame",
            Payload::Track(_) => "track",
        }
    }

    /// Hand the payload to the matching `submit_*` method of `stage`.
    pub async fn submit_to(self, stage: &mut dyn Stage) {
        match self {
            Payload::Packet(packet) => stage.submit_packet(packet).await,
            Payload::Unit(unit) => stage.submit_unit(unit).await,
            Payload::Frame(frame) => stage.submit_frame(frame).await,
            Payload::Track(track) => stage.submit_track(track).await,
        }
    }
}

/// Messages into the worker.
///
/// Control messages serialize as `{"checkSupport":{"className":..}}`,
/// `{"createPipeline":{"pipes":[..]}}` and so on. Inputs carry movable
/// payloads and never leave the process.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerRequest {
    /// Ask whether a stage can run in the worker.
    CheckSupport {
        #[serde(rename = "className")]
        class_name: String,
    },
    /// Build the worker side of the chain. Repeating it is a no-op.
    CreatePipeline { pipes: Vec<String> },
    Setup { config: StageConfig },
    Cleanup,
    UserInteraction,
    #[serde(skip)]
    Input(Payload),
}

/// Severity of a forwarded worker log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Messages out of the worker.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerEvent {
    CheckSupport {
        supported: bool,
    },
    /// Answer to `Setup`; `error` is set when it failed.
    SetupDone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Log {
        level: LogLevel,
        info: String,
    },
    #[serde(skip)]
    Output(Payload),
}

/// Re-emit a worker log line through `tracing` on this side.
pub fn emit_log(level: LogLevel, info: &str) {
    match level {
        LogLevel::Debug => debug!(target: "streamrx_worker::remote", "{info}"),
        LogLevel::Info => info!(target: "streamrx_worker::remote", "{info}"),
        LogLevel::Warn => warn!(target: "streamrx_worker::remote", "{info}"),
        LogLevel::Error => error!(target: "streamrx_worker::remote", "{info}"),
    }
}
