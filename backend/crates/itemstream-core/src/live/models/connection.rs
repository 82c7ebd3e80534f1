//! Connection model
//!
//! A [`Connection`] is the manager-owned handle of one live socket. The
//! socket task owns the receiving halves of its channels (handed out in
//! [`ConnectionRegistration`]) and writes whatever arrives to the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use itemstream_commons::{ConnectionId, Identity, ServerMessage};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{LiveError, Result};

/// Bounded capacity of the control-event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Type alias for sending encoded frames to the socket task
pub type OutboundSender = mpsc::Sender<String>;

/// Type alias for receiving encoded frames in the socket task
pub type OutboundReceiver = mpsc::Receiver<String>;

/// Type alias for sending control events to connections
pub type EventSender = mpsc::Sender<ConnectionEvent>;

/// Type alias for receiving control events
pub type EventReceiver = mpsc::Receiver<ConnectionEvent>;

/// Control events delivered to the socket task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Send a ping to the client
    SendPing,
    /// Heartbeat timeout - close connection
    HeartbeatTimeout,
    /// Server is shutting down - close connection gracefully
    Shutdown,
}

/// One live client connection
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    outbound_tx: OutboundSender,
    event_tx: EventSender,
    connected_at: Instant,
    last_activity: Mutex<Instant>,
    closed: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        identity: Identity,
        outbound_tx: OutboundSender,
        event_tx: EventSender,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity,
            outbound_tx,
            event_tx,
            connected_at: now,
            last_activity: Mutex::new(now),
            closed: AtomicBool::new(false),
        }
    }

    /// Detached connection plus its receivers, for tests and embedders that
    /// drive the registry without a manager
    pub fn detached(
        identity: Identity,
        outbound_buffer: usize,
    ) -> (Arc<Self>, OutboundReceiver, EventReceiver) {
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_buffer.max(1));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let connection = Arc::new(Self::new(ConnectionId::generate(), identity, outbound_tx, event_tx));
        (connection, outbound_rx, event_rx)
    }

    #[inline]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    #[inline]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Record client activity (any inbound frame, including pongs)
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_activity.lock())
    }

    /// Whether the connection was deregistered or its socket task is gone
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.outbound_tx.is_closed()
    }

    /// Set once by the manager before the `closed` lifecycle event
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Queue a frame for the client.
    ///
    /// Fails with [`LiveError::TransportClosed`] once the socket task is gone.
    /// A full outbound buffer drops the frame.
    pub fn send(&self, message: &ServerMessage) -> Result<()> {
        let frame = message.encode()?;
        match self.outbound_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound buffer full for {}, dropping frame", self.id);
                Ok(())
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(LiveError::TransportClosed),
        }
    }

    /// Send and log instead of failing; used where the caller has nobody to
    /// report a dead transport to
    pub fn send_or_log(&self, message: &ServerMessage) {
        if let Err(e) = self.send(message) {
            debug!("Dropping frame for {}: {}", self.id, e);
        }
    }

    pub(crate) fn send_event(&self, event: ConnectionEvent) -> bool {
        self.event_tx.try_send(event).is_ok()
    }
}

/// Result of registering a connection
///
/// The caller keeps `connection` and drains both receivers until the
/// transport closes.
#[derive(Debug)]
pub struct ConnectionRegistration {
    pub connection: Arc<Connection>,
    /// Encoded frames to write to the socket
    pub outbound_rx: OutboundReceiver,
    /// Control events (ping, timeout, shutdown)
    pub event_rx: EventReceiver,
}
