use streamrx_frame::FrameError;

/// Errors that can occur while decoding telemetry frames.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The text frame around the record was malformed.
    #[error("telemetry frame error: {0}")]
    Frame(#[from] FrameError),

    /// The record text was not valid JSON for its tag.
    #[error("telemetry record error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
