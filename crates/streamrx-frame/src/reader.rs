use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::codec::{decode_message, FrameConfig};
use crate::error::{FrameError, Result};

const FILL_SIZE: usize = 8 * 1024;

/// Pulls length-prefixed messages off a blocking byte stream.
///
/// Bytes are accumulated until a whole message is buffered, so short reads
/// never surface to the caller.
pub struct MessageReader<T> {
    stream: T,
    pending: BytesMut,
    config: FrameConfig,
}

impl<T: Read> MessageReader<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: T, config: FrameConfig) -> Self {
        Self {
            stream,
            pending: BytesMut::with_capacity(FILL_SIZE),
            config,
        }
    }

    /// Block until the next message is complete.
    ///
    /// End of stream yields [`FrameError::ConnectionClosed`], whether it falls
    /// between messages or inside one.
    pub fn read_message(&mut self) -> Result<Bytes> {
        loop {
            let max = self.config.max_message_size;
            if let Some(message) = decode_message(&mut self.pending, max)? {
                trace!(len = message.len(), "message read");
                return Ok(message);
            }
            if self.fill()? == 0 {
                if !self.pending.is_empty() {
                    debug!(buffered = self.pending.len(), "stream ended inside a message");
                }
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    fn fill(&mut self) -> Result<usize> {
        let start = self.pending.len();
        self.pending.resize(start + FILL_SIZE, 0);
        loop {
            match self.stream.read(&mut self.pending[start..]) {
                Ok(n) => {
                    self.pending.truncate(start + n);
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.pending.truncate(start);
                    return Err(FrameError::Io(err));
                }
            }
        }
    }
}
