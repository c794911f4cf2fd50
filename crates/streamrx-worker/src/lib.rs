//! Worker delegation for streamrx pipelines.
//!
//! A contiguous run of stages can execute on a background worker: the
//! orchestrating side holds a [`WorkerSender`] in its chain, the worker runs
//! a [`WorkerReceiver`] with its own registry, and the two exchange
//! [`WorkerRequest`]s and [`WorkerEvent`]s over one ordered channel.
//! [`WorkerClient`] answers capability questions for the probe.

pub mod client;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod runtime;
pub mod sender;

pub use client::WorkerClient;
pub use error::{Result, WorkerError};
pub use protocol::{emit_log, LogLevel, Payload, WorkerEvent, WorkerRequest};
pub use receiver::{WorkerOutput, WorkerReceiver};
pub use runtime::{default_factory, spawn_worker, WorkerConfig, WorkerFactory, WorkerLink};
pub use sender::{Connector, WorkerOffload, WorkerSender};
