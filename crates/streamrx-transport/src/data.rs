use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use streamrx_frame::{channel_name, decode_mux, encode_mux};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::channel::{Channel, ChannelAttributes, ChannelReceiver, TransportKind};
use crate::error::{CloseReason, Result, TransportError};

/// A duplex message connection carrying multiplexed channel traffic.
///
/// Implementations only move opaque messages; the channel id prefix is added
/// and stripped by [`DataTransport`]. Incoming messages are handed to
/// [`DataTransport::dispatch`] by whatever drives the connection.
pub trait Connection: Send + Sync {
    /// Queue one message for sending. Never blocks on the peer.
    fn send(&self, message: Bytes) -> Result<()>;

    /// Bytes queued but not yet written, if the connection can tell.
    fn buffered_amount(&self) -> Option<usize> {
        None
    }

    /// Release the connection. Called once when the transport closes.
    fn close(&self) {}
}

/// In-process connection that hands every sent message to a tokio channel.
pub struct MemoryConnection {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl MemoryConnection {
    /// Create a connection and the receiver observing its outgoing messages.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Connection for MemoryConnection {
    fn send(&self, message: Bytes) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| TransportError::Closed(CloseReason::Disconnect))
    }
}

#[derive(Default)]
struct Counters {
    messages_in: AtomicU64,
    messages_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    dropped: AtomicU64,
}

struct ChannelSlot {
    attributes: ChannelAttributes,
    listeners: Vec<mpsc::UnboundedSender<Bytes>>,
}

struct DataInner {
    connection: Arc<dyn Connection>,
    channels: Mutex<HashMap<u8, ChannelSlot>>,
    closed: AtomicBool,
    counters: Counters,
}

/// Many logical channels sharing one duplex [`Connection`].
///
/// Cloning is cheap; clones share the same channel table.
#[derive(Clone)]
pub struct DataTransport {
    inner: Arc<DataInner>,
}

/// Snapshot of data transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataCounters {
    pub messages_in: u64,
    pub messages_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub dropped: u64,
}

impl DataTransport {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            inner: Arc::new(DataInner {
                connection,
                channels: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Declare a channel and get a handle for sending and subscribing.
    ///
    /// Opening an already declared id returns another handle to it, provided
    /// the attributes match.
    pub fn open_channel(&self, id: u8, attributes: ChannelAttributes) -> Result<DataChannel> {
        if self.is_closed() {
            return Err(TransportError::Closed(CloseReason::Disconnect));
        }
        let mut channels = self.channels();
        match channels.get(&id) {
            Some(slot) if slot.attributes != attributes => {
                return Err(TransportError::AttributeConflict { channel: id });
            }
            Some(_) => {}
            None => {
                debug!(channel = id, name = channel_name(id), ?attributes, "channel opened");
                channels.insert(
                    id,
                    ChannelSlot {
                        attributes,
                        listeners: Vec::new(),
                    },
                );
            }
        }
        Ok(DataChannel {
            id,
            attributes,
            transport: self.clone(),
        })
    }

    /// Handle to an already declared channel.
    pub fn channel(&self, id: u8) -> Option<DataChannel> {
        let attributes = self.channels().get(&id)?.attributes;
        Some(DataChannel {
            id,
            attributes,
            transport: self.clone(),
        })
    }

    /// Whether `id` has been declared on this transport.
    pub fn is_open(&self, id: u8) -> bool {
        self.channels().contains_key(&id)
    }

    /// Route one received message to the listeners of its channel.
    ///
    /// Returns the number of listeners that received the payload. Messages
    /// without a header or for undeclared ids are dropped and reported as
    /// [`TransportError::ChannelDeliveryDropped`]; neither is fatal.
    pub fn dispatch(&self, message: Bytes) -> Result<usize> {
        let counters = &self.inner.counters;
        counters.messages_in.fetch_add(1, Ordering::Relaxed);
        counters
            .bytes_in
            .fetch_add(message.len() as u64, Ordering::Relaxed);

        let frame = match decode_mux(&message) {
            Ok(frame) => frame,
            Err(err) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(error = %err, "dropping malformed message");
                return Err(TransportError::ChannelDeliveryDropped {
                    channel: None,
                    reason: err.to_string(),
                });
            }
        };

        let mut channels = self.channels();
        let Some(slot) = channels.get_mut(&frame.channel) else {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(channel = frame.channel, "dropping message for undeclared channel");
            return Err(TransportError::ChannelDeliveryDropped {
                channel: Some(frame.channel),
                reason: "channel not declared".to_string(),
            });
        };

        slot.listeners
            .retain(|listener| listener.send(frame.payload.clone()).is_ok());
        Ok(slot.listeners.len())
    }

    /// Close every channel and the underlying connection. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped_channels = {
            let mut channels = self.channels();
            let count = channels.len();
            channels.clear();
            count
        };
        self.inner.connection.close();
        info!(channels = dropped_channels, "data transport closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Best-effort count of bytes queued on the connection.
    pub fn estimated_buffered_bytes(&self) -> Option<usize> {
        self.inner.connection.buffered_amount()
    }

    pub fn counters(&self) -> DataCounters {
        let c = &self.inner.counters;
        DataCounters {
            messages_in: c.messages_in.load(Ordering::Relaxed),
            messages_out: c.messages_out.load(Ordering::Relaxed),
            bytes_in: c.bytes_in.load(Ordering::Relaxed),
            bytes_out: c.bytes_out.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn open_channel_count(&self) -> usize {
        self.channels().len()
    }

    fn send_on(&self, id: u8, payload: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed(CloseReason::Disconnect));
        }
        if !self.is_open(id) {
            return Err(TransportError::UnknownChannel(id));
        }
        let message = encode_mux(id, payload);
        let len = message.len() as u64;
        self.inner.connection.send(message)?;
        let counters = &self.inner.counters;
        counters.messages_out.fetch_add(1, Ordering::Relaxed);
        counters.bytes_out.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe_on(&self, id: u8) -> Result<ChannelReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut channels = self.channels();
        let slot = channels
            .get_mut(&id)
            .ok_or(TransportError::UnknownChannel(id))?;
        slot.listeners.push(tx);
        Ok(ChannelReceiver::new(id, rx))
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<u8, ChannelSlot>> {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// One logical channel on a [`DataTransport`].
#[derive(Clone)]
pub struct DataChannel {
    id: u8,
    attributes: ChannelAttributes,
    transport: DataTransport,
}

impl DataChannel {
    /// Send one payload; the transport prepends the channel id.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        self.transport.send_on(self.id, payload)
    }

    /// Register a listener for payloads arriving on this channel.
    pub fn subscribe(&self) -> Result<ChannelReceiver> {
        self.transport.subscribe_on(self.id)
    }
}

impl Channel for DataChannel {
    fn id(&self) -> u8 {
        self.id
    }

    fn attributes(&self) -> ChannelAttributes {
        self.attributes
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Data
    }

    fn estimated_buffered_bytes(&self) -> Option<usize> {
        self.transport.estimated_buffered_bytes()
    }
}

impl std::fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChannel")
            .field("id", &self.id)
            .field("name", &channel_name(self.id))
            .field("attributes", &self.attributes)
            .finish()
    }
}
