//! Receiving end of a remote-rendering session.
//!
//! streamrx assembles, at session start, a chain of media stages that turns
//! bytes from the network into rendered frames. Which stages run, and
//! whether part of the chain runs on a background worker, depends on what
//! the current environment supports.
//!
//! # Crate Structure
//!
//! - [`frame`]: byte buffers and wire codecs
//! - [`transport`]: channel multiplexing over data connections and native tracks
//! - [`pipeline`]: stage contract, registry, capability probe and pipeline builder
//! - [`worker`]: worker delegation (behind the `worker` feature)
//! - [`telemetry`]: host statistics channel (behind the `telemetry` feature)

/// Re-export frame types.
pub mod frame {
    pub use streamrx_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use streamrx_transport::*;
}

/// Re-export pipeline types.
pub mod pipeline {
    pub use streamrx_pipeline::*;
}

/// Re-export worker types (requires `worker` feature).
#[cfg(feature = "worker")]
pub mod worker {
    pub use streamrx_worker::*;
}

/// Re-export telemetry types (requires `telemetry` feature).
#[cfg(feature = "telemetry")]
pub mod telemetry {
    pub use streamrx_telemetry::*;
}
