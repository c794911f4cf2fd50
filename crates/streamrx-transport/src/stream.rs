//! Data transport over a plain byte stream.
//!
//! A byte stream has no message boundaries, so every multiplexed message is
//! additionally length-prefixed on the wire. Two named threads own the
//! stream halves: a writer draining the outgoing queue, and a pump reading
//! messages and feeding them to [`DataTransport::dispatch`].

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use bytes::Bytes;
use streamrx_frame::{FrameConfig, FrameError, MessageReader, MessageWriter};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::data::Connection;
use crate::error::{CloseReason, Result, TransportError};
use crate::session::SessionTransport;

/// [`Connection`] queueing length-prefixed messages for a writer thread.
///
/// `send` only enqueues; callers watch [`Connection::buffered_amount`] for
/// backpressure.
pub struct StreamConnection {
    outgoing: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    queued: Arc<AtomicUsize>,
    max_message_size: usize,
}

impl StreamConnection {
    /// Start the `streamrx-writer` thread owning `writer`.
    ///
    /// `on_finish` runs on that thread once the queue is closed and drained,
    /// or after a write error, e.g. to shut down the socket so the peer's
    /// pump sees EOF.
    pub fn spawn<W, F>(writer: W, config: FrameConfig, on_finish: F) -> std::io::Result<Self>
    where
        W: Write + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let max_message_size = config.max_message_size;
        let writer = MessageWriter::with_config(writer, config);
        let counter = Arc::clone(&queued);
        std::thread::Builder::new()
            .name("streamrx-writer".to_string())
            .spawn(move || {
                write_queued(writer, rx, &counter);
                on_finish();
            })?;
        Ok(Self {
            outgoing: Mutex::new(Some(tx)),
            queued,
            max_message_size,
        })
    }
}

impl Connection for StreamConnection {
    fn send(&self, message: Bytes) -> Result<()> {
        let len = message.len();
        if len > self.max_message_size {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.max_message_size,
            }
            .into());
        }
        let outgoing = self.outgoing.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = outgoing.as_ref() else {
            return Err(TransportError::Closed(CloseReason::Disconnect));
        };
        self.queued.fetch_add(len, Ordering::Relaxed);
        if tx.send(message).is_err() {
            // The writer stopped after a write error.
            self.queued.fetch_sub(len, Ordering::Relaxed);
            return Err(TransportError::Closed(CloseReason::Failed));
        }
        Ok(())
    }

    fn buffered_amount(&self) -> Option<usize> {
        Some(self.queued.load(Ordering::Relaxed))
    }

    fn close(&self) {
        // Dropping the sender lets the writer flush what is queued, then finish.
        self.outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn write_queued<W: Write>(
    mut writer: MessageWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    queued: &AtomicUsize,
) {
    while let Some(message) = rx.blocking_recv() {
        let result = writer.send(&message);
        queued.fetch_sub(message.len(), Ordering::Relaxed);
        if let Err(err) = result {
            warn!(error = %err, "stream write failed");
            rx.close();
            let mut discarded = 0usize;
            while let Ok(message) = rx.try_recv() {
                queued.fetch_sub(message.len(), Ordering::Relaxed);
                discarded += 1;
            }
            debug!(discarded, "outgoing queue discarded");
            return;
        }
        trace!(len = message.len(), "queued message written");
    }
    debug!("outgoing queue closed");
}

/// Spawn a thread that reads messages from `reader` and dispatches them on
/// the session's data transport until the stream ends.
///
/// EOF closes the session with [`CloseReason::Disconnect`]; any other read
/// error fails it.
pub fn spawn_pump<R: Read + Send + 'static>(
    reader: R,
    session: SessionTransport,
) -> std::io::Result<JoinHandle<()>> {
    let config = session.config().frame.clone();
    std::thread::Builder::new()
        .name("streamrx-pump".to_string())
        .spawn(move || {
            let Some(data) = session.data().cloned() else {
                warn!("pump started on a session without a data transport");
                return;
            };
            let mut reader = MessageReader::with_config(reader, config);
            loop {
                match reader.read_message() {
                    Ok(message) => {
                        // Undeliverable messages are already logged by dispatch.
                        let _ = data.dispatch(message);
                    }
                    Err(FrameError::ConnectionClosed) => {
                        debug!("stream ended");
                        session.close(CloseReason::Disconnect);
                        return;
                    }
                    Err(err) => {
                        if !session.is_closed() {
                            warn!(error = %err, "stream read failed");
                        }
                        session.fail();
                        return;
                    }
                }
            }
        })
}

/// Build a data-only session over a connected Unix stream and start its pump.
#[cfg(unix)]
pub fn connect_unix(
    stream: std::os::unix::net::UnixStream,
    config: crate::session::TransportConfig,
) -> Result<(SessionTransport, JoinHandle<()>)> {
    use crate::data::DataTransport;

    let reader = stream.try_clone()?;
    let shutdown = stream.try_clone()?;
    let connection = StreamConnection::spawn(stream, config.frame.clone(), move || {
        let _ = shutdown.shutdown(std::net::Shutdown::Both);
    })?;
    let data = DataTransport::new(Arc::new(connection));
    let session = SessionTransport::new(config, Some(data), None);
    let pump = spawn_pump(reader, session.clone())?;
    session.mark_connected();
    Ok((session, pump))
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, Instant};

    use streamrx_frame::{HOST_VIDEO, KEYBOARD};

    use super::*;
    use crate::channel::ChannelAttributes;
    use crate::session::{TransportConfig, TransportState};

    #[tokio::test]
    async fn multiplexed_roundtrip_over_socket_pair() {
        let (left, right) = UnixStream::pair().unwrap();
        let (host, host_pump) = connect_unix(left, TransportConfig::default()).unwrap();
        let (client, client_pump) = connect_unix(right, TransportConfig::default()).unwrap();

        let host_video = host
            .open_channel(HOST_VIDEO, ChannelAttributes::UNRELIABLE_ORDERED)
            .unwrap();
        let client_video = client
            .open_channel(HOST_VIDEO, ChannelAttributes::UNRELIABLE_ORDERED)
            .unwrap();
        let client_keys = client
            .open_channel(KEYBOARD, ChannelAttributes::RELIABLE_ORDERED)
            .unwrap();
        let mut video_rx = client_video.subscribe().unwrap();
        let mut keys_rx = client_keys.subscribe().unwrap();

        host_video.send(b"frame-0").unwrap();
        let got = tokio::time::timeout(Duration::from_secs(2), video_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.as_ref(), b"frame-0");
        assert!(keys_rx.try_recv().is_none());
        assert!(eventually(|| host.estimated_buffered_bytes() == Some(0)));

        host.close(CloseReason::Disconnect);
        host_pump.join().unwrap();
        client_pump.join().unwrap();
        assert_eq!(
            client.state(),
            TransportState::Closed(CloseReason::Disconnect)
        );
    }

    fn eventually(mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        check()
    }

    #[test]
    fn send_returns_while_peer_is_not_reading() {
        let (left, right) = UnixStream::pair().unwrap();
        let (host, pump) = connect_unix(left, TransportConfig::default()).unwrap();
        let video = host
            .open_channel(HOST_VIDEO, ChannelAttributes::UNRELIABLE_ORDERED)
            .unwrap();

        // Far more than the socket buffers hold; `right` is never read.
        let chunk = vec![0x42u8; 60 * 1024];
        let total = 64 * (chunk.len() + 1);
        let started = Instant::now();
        for _ in 0..64 {
            video.send(&chunk).unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        let buffered = host.estimated_buffered_bytes().unwrap();
        assert!(buffered > total / 2, "buffered {buffered} of {total}");
        assert!(buffered <= total);

        // Dropping the peer fails the stalled write and empties the queue.
        drop(right);
        pump.join().unwrap();
        assert!(host.is_closed());
        assert!(eventually(|| host.estimated_buffered_bytes() == Some(0)));
    }

    #[test]
    fn oversized_message_is_refused_before_queueing() {
        let (left, _right) = UnixStream::pair().unwrap();
        let config = FrameConfig {
            max_message_size: 8,
        };
        let connection = StreamConnection::spawn(left, config, || {}).unwrap();
        assert!(matches!(
            connection.send(Bytes::from_static(b"nine bytes")),
            Err(TransportError::Frame(FrameError::PayloadTooLarge { size: 10, max: 8 }))
        ));
        assert_eq!(connection.buffered_amount(), Some(0));
        connection.close();
        assert!(matches!(
            connection.send(Bytes::from_static(b"late")),
            Err(TransportError::Closed(CloseReason::Disconnect))
        ));
    }
}
