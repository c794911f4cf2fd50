//! Stats records carried on the telemetry channel.
//!
//! Each frame is `[len: u16 BE][utf8 JSON]` where the JSON is a single
//! externally-tagged record, e.g. `{"Rtt":{"rtt_ms":12.5,"rtt_variance_ms":1.0}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use streamrx_frame::{decode_text, encode_text, ByteBuffer};

use crate::error::Result;

/// Round-trip time measured by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RttStats {
    pub rtt_ms: f64,
    pub rtt_variance_ms: f64,
}

/// Video latency breakdown reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoStats {
    pub min_host_processing_latency_ms: f64,
    pub max_host_processing_latency_ms: f64,
    pub avg_host_processing_latency_ms: f64,
    pub min_streamer_processing_time_ms: f64,
    pub max_streamer_processing_time_ms: f64,
    pub avg_streamer_processing_time_ms: f64,
}

/// One record from the closed set of tags the host sends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StatsRecord {
    Rtt(RttStats),
    Video(VideoStats),
}

impl StatsRecord {
    pub const TAGS: [&'static str; 2] = ["Rtt", "Video"];

    pub fn tag(&self) -> &'static str {
        match self {
            StatsRecord::Rtt(_) => "Rtt",
            StatsRecord::Video(_) => "Video",
        }
    }

    /// Parse one record's JSON text.
    ///
    /// Returns `Ok(None)` for a well-formed record with a tag outside
    /// [`Self::TAGS`].
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(text)?;
        let known = value
            .as_object()
            .and_then(|object| object.keys().next())
            .is_some_and(|tag| Self::TAGS.contains(&tag.as_str()));
        if !known {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Decode one telemetry frame.
    pub fn decode(frame: &[u8]) -> Result<Option<Self>> {
        let text = decode_text(frame)?;
        Self::parse(&text)
    }

    /// Encode this record as a telemetry frame.
    pub fn encode(&self, dst: &mut ByteBuffer) -> Result<()> {
        let text = serde_json::to_string(self)?;
        encode_text(&text, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;

    fn frame(text: &str) -> Vec<u8> {
        let mut buf = ByteBuffer::bulk();
        encode_text(text, &mut buf).unwrap();
        buf.written().to_vec()
    }

    #[test]
    fn rtt_record_decodes() {
        let record =
            StatsRecord::decode(&frame(r#"{"Rtt":{"rtt_ms":12.5,"rtt_variance_ms":0.75}}"#))
                .unwrap();
        assert_eq!(
            record,
            Some(StatsRecord::Rtt(RttStats {
                rtt_ms: 12.5,
                rtt_variance_ms: 0.75,
            }))
        );
    }

    #[test]
    fn video_record_tolerates_missing_fields() {
        let record =
            StatsRecord::decode(&frame(r#"{"Video":{"avg_host_processing_latency_ms":4.0}}"#))
                .unwrap()
                .unwrap();
        match record {
            StatsRecord::Video(video) => {
                assert_eq!(video.avg_host_processing_latency_ms, 4.0);
                assert_eq!(video.max_streamer_processing_time_ms, 0.0);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_ignored() {
        assert_eq!(
            StatsRecord::decode(&frame(r#"{"Audio":{"jitter_ms":3}}"#)).unwrap(),
            None
        );
        assert_eq!(StatsRecord::parse("[1,2]").unwrap(), None);
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            StatsRecord::decode(&[0x00]),
            Err(TelemetryError::Frame(_))
        ));
        assert!(matches!(
            StatsRecord::decode(&frame("{not json")),
            Err(TelemetryError::Json(_))
        ));
        assert!(matches!(
            StatsRecord::decode(&frame(r#"{"Rtt":{"rtt_ms":"fast"}}"#)),
            Err(TelemetryError::Json(_))
        ));
    }

    #[test]
    fn encoded_record_uses_external_tag() {
        let mut buf = ByteBuffer::bulk();
        StatsRecord::Rtt(RttStats {
            rtt_ms: 8.0,
            rtt_variance_ms: 1.0,
        })
        .encode(&mut buf)
        .unwrap();
        let text = decode_text(buf.written()).unwrap();
        assert_eq!(text, r#"{"Rtt":{"rtt_ms":8.0,"rtt_variance_ms":1.0}}"#);
    }
}
