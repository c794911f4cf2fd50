//! Host statistics for streamrx sessions.
//!
//! The host reports [`StatsRecord`]s on the `STATS` data channel. A
//! telemetry consumer started with [`spawn_telemetry`] decodes them into a
//! [`StatsAggregate`] and periodically merges the local transport snapshot
//! into the same value.

pub mod aggregate;
pub mod channel;
pub mod error;
pub mod record;

pub use aggregate::StatsAggregate;
pub use channel::{spawn_telemetry, TelemetryConfig, TelemetryHandle};
pub use error::{Result, TelemetryError};
pub use record::{RttStats, StatsRecord, VideoStats};
