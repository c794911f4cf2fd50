//! Byte framing and wire codecs for streamrx.
//!
//! This is the lowest layer of streamrx. It owns every byte-level format the
//! receiving end of a session understands:
//! - [`ByteBuffer`], a pre-sized cursor buffer with fixed endianness
//! - the data-transport multiplex frame (`[channel: u8][payload]`)
//! - the media depacketization frame (`[type: u8][timestamp: u32 BE][payload]`)
//! - the telemetry text frame (`[len: u16 BE][utf8]`)
//! - length-prefixed message framing for plain byte streams

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod error;
pub mod media;
pub mod packet;
pub mod reader;
pub mod writer;

pub use buffer::{BufferMode, ByteBuffer, Endian, BULK_CAPACITY, CONTROL_CAPACITY};
pub use channel::{
    channel_name, controller_channel, CONTROLLERS, CONTROLLER_COUNT, GENERAL, HOST_AUDIO,
    HOST_VIDEO, KEYBOARD, MOUSE_ABSOLUTE, MOUSE_RELATIVE, MOUSE_RELIABLE, STATS, TOUCH,
};
pub use codec::{
    decode_message, decode_mux, decode_text, encode_message, encode_mux, encode_text, FrameConfig,
    MuxFrame, DEFAULT_MAX_MESSAGE, MESSAGE_HEADER_SIZE, MUX_HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use media::{EncodedUnit, FrameType, MediaFrame, MediaKind};
pub use packet::{decode_packet, encode_packet, PACKET_HEADER_SIZE};
pub use reader::MessageReader;
pub use writer::MessageWriter;
