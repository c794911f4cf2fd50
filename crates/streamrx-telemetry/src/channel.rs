use std::time::Duration;

use bytes::Bytes;
use streamrx_frame::STATS;
use streamrx_transport::{ChannelAttributes, ChannelReceiver, SessionTransport};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregate::StatsAggregate;
use crate::record::StatsRecord;

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// How often the transport snapshot is merged.
    pub interval: Duration,
    /// Channel carrying host stats records.
    pub channel: u8,
    pub attributes: ChannelAttributes,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            channel: STATS,
            attributes: ChannelAttributes::RELIABLE_ORDERED,
        }
    }
}

/// Running telemetry consumer for one session.
#[derive(Debug)]
pub struct TelemetryHandle {
    stats: watch::Receiver<StatsAggregate>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TelemetryHandle {
    /// Current aggregate. Never waits on the receive loop.
    pub fn snapshot(&self) -> StatsAggregate {
        self.stats.borrow().clone()
    }

    /// Observe every aggregate update.
    pub fn subscribe(&self) -> watch::Receiver<StatsAggregate> {
        self.stats.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the consumer and return the final aggregate.
    pub async fn stop(mut self) -> StatsAggregate {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.snapshot()
    }
}

impl Drop for TelemetryHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Subscribe to the stats channel of `session` and start aggregating.
///
/// Must be called within a tokio runtime.
pub fn spawn_telemetry(
    session: &SessionTransport,
    config: TelemetryConfig,
) -> streamrx_transport::Result<TelemetryHandle> {
    let channel = session.open_channel(config.channel, config.attributes)?;
    let receiver = channel.subscribe()?;
    let (tx, stats) = watch::channel(StatsAggregate::default());
    let token = CancellationToken::new();

    let task = tokio::spawn(run(
        session.clone(),
        receiver,
        tx,
        config.interval,
        token.clone(),
    ));
    info!(
        channel = config.channel,
        interval_ms = config.interval.as_millis() as u64,
        "telemetry started"
    );
    Ok(TelemetryHandle {
        stats,
        token,
        task: Some(task),
    })
}

async fn run(
    session: SessionTransport,
    mut receiver: ChannelReceiver,
    stats: watch::Sender<StatsAggregate>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            frame = receiver.recv() => match frame {
                Some(frame) => apply_frame(&stats, &frame),
                None => {
                    debug!("stats channel closed");
                    break;
                }
            },
            _ = ticker.tick() => {
                let snapshot = session.get_stats();
                stats.send_modify(|aggregate| aggregate.merge_transport(snapshot));
            }
        }
    }
    while let Some(frame) = receiver.try_recv() {
        apply_frame(&stats, &frame);
    }
    let snapshot = session.get_stats();
    stats.send_modify(|aggregate| aggregate.merge_transport(snapshot));
    debug!("telemetry stopped");
}

fn apply_frame(stats: &watch::Sender<StatsAggregate>, frame: &Bytes) {
    match StatsRecord::decode(frame) {
        Ok(Some(record)) => stats.send_modify(|aggregate| aggregate.apply(record)),
        Ok(None) => {
            debug!(len = frame.len(), "ignoring stats record with unknown tag");
            stats.send_modify(StatsAggregate::ignore);
        }
        Err(err) => {
            debug!(error = %err, "ignoring malformed stats frame");
            stats.send_modify(StatsAggregate::ignore);
        }
    }
}
