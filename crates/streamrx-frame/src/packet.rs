//! Media depacketization frame.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────┬───────────────┐
//! │ Type (1B)  │ Timestamp (4B BE)│ Payload       │
//! │ 0=delta    │ milliseconds     │ (rest)        │
//! │ 1=key      │                  │               │
//! └────────────┴──────────────────┴───────────────┘
//! ```
//! The type byte is only meaningful for video; audio senders write zero.

use bytes::Bytes;

use crate::buffer::{ByteBuffer, Endian};
use crate::error::{FrameError, Result};
use crate::media::{EncodedUnit, FrameType, MediaKind};

/// Type (1) + timestamp (4).
pub const PACKET_HEADER_SIZE: usize = 5;

/// Split a received media packet into an [`EncodedUnit`].
///
/// The payload is a zero-copy slice of `packet`. Duration is left at zero;
/// the caller knows the stream rate.
pub fn decode_packet(kind: MediaKind, packet: &Bytes) -> Result<EncodedUnit> {
    if packet.len() < PACKET_HEADER_SIZE {
        return Err(FrameError::Truncated {
            what: "media packet",
            needed: PACKET_HEADER_SIZE,
            got: packet.len(),
        });
    }

    let mut header = ByteBuffer::wrap(&packet[..PACKET_HEADER_SIZE], Endian::Big);
    let type_byte = header.get_u8()?;
    let timestamp_ms = u64::from(header.get_u32()?);

    let frame_type = match kind {
        MediaKind::Video => Some(FrameType::from_wire(type_byte)),
        MediaKind::Audio => None,
    };

    Ok(EncodedUnit {
        kind,
        frame_type,
        timestamp_ms,
        duration_us: 0,
        payload: packet.slice(PACKET_HEADER_SIZE..),
    })
}

/// Write an [`EncodedUnit`] back into the packet wire format.
///
/// Fails with [`FrameError::TimestampOverflow`] when the timestamp does not
/// fit the 32-bit field; nothing is written in that case.
pub fn encode_packet(unit: &EncodedUnit, dst: &mut ByteBuffer) -> Result<()> {
    dst.ensure_endian(Endian::Big)?;
    let timestamp = u32::try_from(unit.timestamp_ms).map_err(|_| FrameError::TimestampOverflow {
        value: unit.timestamp_ms,
        bits: u32::BITS,
    })?;
    let type_byte = unit.frame_type.map(FrameType::to_wire).unwrap_or(0);
    dst.put_u8(type_byte)?;
    dst.put_u32(timestamp)?;
    dst.put_bytes(&unit.payload)?;
    Ok(())
}
