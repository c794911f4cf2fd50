use serde::Serialize;
use streamrx_transport::TransportStats;

use crate::record::{RttStats, StatsRecord, VideoStats};

/// Latest view of a session's statistics.
///
/// Host records and local transport snapshots land in the same value; each
/// field holds the most recent sample of its kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsAggregate {
    pub rtt: Option<RttStats>,
    pub video: Option<VideoStats>,
    pub transport: Option<TransportStats>,
    /// Records applied.
    pub records: u64,
    /// Frames dropped as malformed or carrying an unknown tag.
    pub ignored: u64,
    /// Transport snapshots merged.
    pub snapshots: u64,
}

impl StatsAggregate {
    pub fn apply(&mut self, record: StatsRecord) {
        match record {
            StatsRecord::Rtt(rtt) => self.rtt = Some(rtt),
            StatsRecord::Video(video) => self.video = Some(video),
        }
        self.records += 1;
    }

    pub fn ignore(&mut self) {
        self.ignored += 1;
    }

    pub fn merge_transport(&mut self, stats: TransportStats) {
        self.transport = Some(stats);
        self.snapshots += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_sample_wins() {
        let mut aggregate = StatsAggregate::default();
        aggregate.apply(StatsRecord::Rtt(RttStats {
            rtt_ms: 30.0,
            rtt_variance_ms: 2.0,
        }));
        aggregate.apply(StatsRecord::Rtt(RttStats {
            rtt_ms: 20.0,
            rtt_variance_ms: 1.0,
        }));
        aggregate.ignore();
        aggregate.merge_transport(TransportStats {
            bytes_in: 64,
            ..TransportStats::default()
        });

        assert_eq!(aggregate.rtt.map(|rtt| rtt.rtt_ms), Some(20.0));
        assert_eq!(aggregate.video, None);
        assert_eq!(aggregate.records, 2);
        assert_eq!(aggregate.ignored, 1);
        assert_eq!(aggregate.transport.map(|t| t.bytes_in), Some(64));
    }
}
