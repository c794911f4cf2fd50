use std::io::{ErrorKind, Write};

use tracing::trace;

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};

/// Pushes length-prefixed messages onto a blocking byte stream.
///
/// A non-blocking stream reporting `WouldBlock` surfaces as
/// [`FrameError::Io`]; only `Interrupted` is retried.
pub struct MessageWriter<T> {
    stream: T,
    config: FrameConfig,
}

impl<T: Write> MessageWriter<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: T, config: FrameConfig) -> Self {
        Self { stream, config }
    }

    /// Write one message and flush.
    ///
    /// Messages above the configured maximum are refused before any byte
    /// reaches the stream.
    pub fn send(&mut self, message: &[u8]) -> Result<()> {
        let max = self.config.max_message_size.min(u32::MAX as usize);
        if message.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: message.len(),
                max,
            });
        }

        let header = (message.len() as u32).to_be_bytes();
        self.write_fully(&header)?;
        self.write_fully(message)?;
        retry(|| self.stream.flush())?;
        trace!(len = message.len(), "message written");
        Ok(())
    }

    fn write_fully(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let written = retry(|| self.stream.write(bytes))?;
            if written == 0 {
                return Err(FrameError::ConnectionClosed);
            }
            bytes = &bytes[written..];
        }
        Ok(())
    }
}

fn retry<R>(mut op: impl FnMut() -> std::io::Result<R>) -> Result<R> {
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::channel::HOST_AUDIO;
    use crate::codec::{decode_message, encode_mux};

    #[test]
    fn written_messages_decode_back() {
        let audio = encode_mux(HOST_AUDIO, b"\x01\x00\x00\x4e\x20pcm");
        let mut writer = MessageWriter::new(Vec::new());
        writer.send(&audio).unwrap();
        writer.send(b"").unwrap();

        let mut wire = BytesMut::from(writer.stream.as_slice());
        assert_eq!(decode_message(&mut wire, usize::MAX).unwrap().unwrap(), audio);
        assert!(decode_message(&mut wire, usize::MAX).unwrap().unwrap().is_empty());
        assert!(wire.is_empty());
    }

    #[test]
    fn oversized_message_writes_nothing() {
        let config = FrameConfig {
            max_message_size: 4,
        };
        let mut writer = MessageWriter::with_config(Vec::new(), config);
        assert!(matches!(
            writer.send(b"too long"),
            Err(FrameError::PayloadTooLarge { size: 8, max: 4 })
        ));
        assert!(writer.stream.is_empty());
    }

    #[test]
    fn interrupted_and_short_writes_are_retried() {
        let mut writer = MessageWriter::new(Flaky::default());
        writer.send(b"retry").unwrap();
        assert_eq!(writer.stream.data, b"\x00\x00\x00\x05retry");
        assert!(writer.stream.flushed);
    }

    #[test]
    fn zero_length_write_means_closed() {
        let mut writer = MessageWriter::new(Closed);
        assert!(matches!(
            writer.send(b"x"),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn would_block_is_reported_not_retried() {
        let mut writer = MessageWriter::new(Full { attempts: 0 });
        let err = writer.send(b"stalled").unwrap_err();
        assert!(matches!(err, FrameError::Io(ref io) if io.kind() == ErrorKind::WouldBlock));
        assert_eq!(writer.stream.attempts, 1);
    }

    struct Full {
        attempts: usize,
    }

    impl Write for Full {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            self.attempts += 1;
            Err(ErrorKind::WouldBlock.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Interrupts every other call and accepts at most two bytes per write.
    #[derive(Default)]
    struct Flaky {
        calls: usize,
        data: Vec<u8>,
        flushed: bool,
    }

    impl Flaky {
        fn interrupt(&mut self) -> bool {
            self.calls += 1;
            self.calls % 2 == 1
        }
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.interrupt() {
                return Err(ErrorKind::Interrupted.into());
            }
            let n = buf.len().min(2);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if self.interrupt() {
                return Err(ErrorKind::Interrupted.into());
            }
            self.flushed = true;
            Ok(())
        }
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
