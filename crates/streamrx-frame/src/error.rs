/// Errors that can occur in byte buffers and wire codecs.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A read or write would cross the buffer limit.
    #[error("buffer {op} out of bounds (needed {needed} bytes, {available} available)")]
    OutOfBounds {
        op: &'static str,
        needed: usize,
        available: usize,
    },

    /// A put was issued in read mode, or a get in write mode.
    #[error("buffer is in {actual:?} mode, {op} requires the other mode")]
    WrongMode {
        op: &'static str,
        actual: crate::buffer::BufferMode,
    },

    /// The buffer was used with an endianness other than the one it was built with.
    #[error("buffer endianness is {actual:?}, caller expected {expected:?}")]
    EndiannessMismatch {
        expected: crate::buffer::Endian,
        actual: crate::buffer::Endian,
    },

    /// A wire frame is shorter than its fixed header.
    #[error("truncated {what} (needed {needed} bytes, got {got})")]
    Truncated {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A timestamp does not fit its wire field.
    #[error("timestamp {value} does not fit a {bits}-bit wire field")]
    TimestampOverflow { value: u64, bits: u32 },

    /// A text frame did not contain valid UTF-8.
    #[error("text frame is not valid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
