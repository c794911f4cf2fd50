#![cfg(unix)]

use std::os::unix::net::UnixStream;
use std::time::Duration;

use streamrx_frame::{ByteBuffer, STATS};
use streamrx_telemetry::{spawn_telemetry, RttStats, StatsRecord, TelemetryConfig, VideoStats};
use streamrx_transport::{connect_unix, ChannelAttributes, CloseReason, TransportConfig};

fn frame(record: StatsRecord) -> Vec<u8> {
    let mut buf = ByteBuffer::bulk();
    record.encode(&mut buf).unwrap();
    buf.written().to_vec()
}

#[tokio::test]
async fn host_records_reach_the_aggregate() {
    let (left, right) = UnixStream::pair().unwrap();
    let (host, host_pump) = connect_unix(left, TransportConfig::default()).unwrap();
    let (client, client_pump) = connect_unix(right, TransportConfig::default()).unwrap();

    let telemetry = spawn_telemetry(&client, TelemetryConfig::default()).unwrap();
    let stats = host
        .open_channel(STATS, ChannelAttributes::RELIABLE_ORDERED)
        .unwrap();

    stats
        .send(&frame(StatsRecord::Rtt(RttStats {
            rtt_ms: 21.0,
            rtt_variance_ms: 3.0,
        })))
        .unwrap();
    stats.send(br#"{"Rtt":1}"#).unwrap();
    stats
        .send(&frame(StatsRecord::Video(VideoStats {
            avg_host_processing_latency_ms: 5.5,
            ..VideoStats::default()
        })))
        .unwrap();

    let mut updates = telemetry.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        updates.wait_for(|aggregate| aggregate.records + aggregate.ignored == 3),
    )
    .await
    .unwrap()
    .unwrap();

    let snapshot = telemetry.snapshot();
    assert_eq!(snapshot.rtt.map(|rtt| rtt.rtt_ms), Some(21.0));
    assert_eq!(
        snapshot.video.map(|video| video.avg_host_processing_latency_ms),
        Some(5.5)
    );
    assert_eq!(snapshot.records, 2);
    assert_eq!(snapshot.ignored, 1);

    // Closing the client ends the stats channel, which stops the consumer.
    client.close(CloseReason::Disconnect);
    let last = tokio::time::timeout(Duration::from_secs(2), telemetry.stop())
        .await
        .unwrap();
    assert!(last.transport.unwrap().messages_in >= 3);

    host.close(CloseReason::Disconnect);
    host_pump.join().unwrap();
    client_pump.join().unwrap();
}
