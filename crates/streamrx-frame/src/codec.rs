use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::buffer::{ByteBuffer, Endian};
use crate::error::{FrameError, Result};

/// Multiplex header: channel id (1).
pub const MUX_HEADER_SIZE: usize = 1;

/// Stream message header: length (4).
pub const MESSAGE_HEADER_SIZE: usize = 4;

/// Telemetry text header: length (2).
pub const TEXT_HEADER_SIZE: usize = 2;

/// Default maximum message size on a byte stream: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// A data-transport message with channel routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxFrame {
    /// The logical channel this message belongs to.
    pub channel: u8,
    /// The channel payload.
    pub payload: Bytes,
}

impl MuxFrame {
    /// Create a new frame.
    pub fn new(channel: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        MUX_HEADER_SIZE + self.payload.len()
    }
}

/// Encode one data-transport message.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┐
/// │ Channel (1B) │ Payload (rest)   │
/// └──────────────┴──────────────────┘
/// ```
pub fn encode_mux(channel: u8, payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(MUX_HEADER_SIZE + payload.len());
    dst.put_u8(channel);
    dst.put_slice(payload);
    dst.freeze()
}

/// Decode one data-transport message.
///
/// The payload is a zero-copy slice of `message`.
pub fn decode_mux(message: &Bytes) -> Result<MuxFrame> {
    let Some(&channel) = message.first() else {
        return Err(FrameError::Truncated {
            what: "multiplex header",
            needed: MUX_HEADER_SIZE,
            got: 0,
        });
    };
    Ok(MuxFrame {
        channel,
        payload: message.slice(MUX_HEADER_SIZE..),
    })
}

/// Encode a telemetry text frame: `[u16 BE length][utf8]`.
pub fn encode_text(text: &str, dst: &mut ByteBuffer) -> Result<()> {
    dst.ensure_endian(Endian::Big)?;
    let len = u16::try_from(text.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: text.len(),
        max: u16::MAX as usize,
    })?;
    dst.put_u16(len)?;
    dst.put_bytes(text.as_bytes())?;
    Ok(())
}

/// Decode a telemetry text frame.
///
/// Bytes after the declared length are ignored.
pub fn decode_text(frame: &[u8]) -> Result<String> {
    let mut buf = ByteBuffer::wrap(frame, Endian::Big);
    if buf.remaining() < TEXT_HEADER_SIZE {
        return Err(FrameError::Truncated {
            what: "text header",
            needed: TEXT_HEADER_SIZE,
            got: buf.remaining(),
        });
    }
    let len = buf.get_u16()? as usize;
    if buf.remaining() < len {
        return Err(FrameError::Truncated {
            what: "text body",
            needed: len,
            got: buf.remaining(),
        });
    }
    let text = std::str::from_utf8(buf.get_bytes(len)?)?;
    Ok(text.to_string())
}

/// Encode one length-prefixed message for a byte stream.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────┐
/// │ Length (4B BE)│ Message         │
/// └──────────────┴─────────────────┘
/// ```
pub fn encode_message(message: &[u8], dst: &mut BytesMut) -> Result<()> {
    if message.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: message.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(MESSAGE_HEADER_SIZE + message.len());
    dst.put_u32(message.len() as u32);
    dst.put_slice(message);
    Ok(())
}

/// Decode one length-prefixed message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_message: usize) -> Result<Option<Bytes>> {
    if src.len() < MESSAGE_HEADER_SIZE {
        return Ok(None);
    }

    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > max_message {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: max_message,
        });
    }

    let total = MESSAGE_HEADER_SIZE + len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(MESSAGE_HEADER_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}

/// Configuration for stream message framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum message size in bytes. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_prefixes_channel_id() {
        let wire = encode_mux(7, b"keys");
        assert_eq!(wire.as_ref(), b"\x07keys");

        let frame = decode_mux(&wire).unwrap();
        assert_eq!(frame.channel, 7);
        assert_eq!(frame.payload.as_ref(), b"keys");
        assert_eq!(frame.wire_size(), 5);
    }

    #[test]
    fn mux_empty_message_is_truncated() {
        let err = decode_mux(&Bytes::new()).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { got: 0, .. }));
    }

    #[test]
    fn mux_header_only_has_empty_payload() {
        let frame = decode_mux(&Bytes::from_static(&[3])).unwrap();
        assert_eq!(frame.channel, 3);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn text_frame_roundtrip() {
        let mut buf = ByteBuffer::bulk();
        encode_text("{\"Rtt\":{}}", &mut buf).unwrap();
        assert_eq!(&buf.written()[..2], &[0, 10]);
        assert_eq!(decode_text(buf.written()).unwrap(), "{\"Rtt\":{}}");
    }

    #[test]
    fn text_frame_short_body_is_truncated() {
        let err = decode_text(&[0, 9, b'a']).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { what: "text body", .. }));
    }

    #[test]
    fn text_frame_rejects_invalid_utf8() {
        let err = decode_text(&[0, 2, 0xC3, 0x28]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8(_)));
    }

    #[test]
    fn message_roundtrip_and_partial() {
        let mut buf = BytesMut::new();
        encode_message(b"first", &mut buf).unwrap();
        encode_message(b"second", &mut buf).unwrap();

        let first = decode_message(&mut buf, DEFAULT_MAX_MESSAGE).unwrap().unwrap();
        assert_eq!(first.as_ref(), b"first");

        let mut partial = buf.split_to(6);
        assert!(decode_message(&mut partial, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .is_none());
        partial.unsplit(buf);
        let second = decode_message(&mut partial, DEFAULT_MAX_MESSAGE).unwrap().unwrap();
        assert_eq!(second.as_ref(), b"second");
        assert!(partial.is_empty());
    }

    #[test]
    fn message_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32(1024);
        let result = decode_message(&mut buf, 16);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }
}
