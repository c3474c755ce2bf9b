//! WebSocket client connection state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::TransportError;

/// Opaque connection identifier (`conn_<uuid v7>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh, time-ordered identifier.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Borrow the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Lifecycle of a connection.
///
/// `Connecting -> Open -> Active -> Closing -> Closed`. Any non-terminal state
/// may move to `Closing`; `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Upgraded but not yet registered with the hub.
    Connecting = 0,
    /// Registered; no traffic yet.
    Open = 1,
    /// At least one frame has flowed in either direction.
    Active = 2,
    /// Removed from the hub; writer is flushing a close frame.
    Closing = 3,
    /// Transport released.
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Active,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why a connection left the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame or hung up.
    ClientClosed,
    /// Reading from the socket failed.
    ReadFailure,
    /// An inbound message could not be decoded.
    MalformedMessage,
    /// The client did not answer a liveness probe.
    HeartbeatTimeout,
    /// Writing to the socket failed or the send queue overflowed.
    WriteFailure,
    /// The hub was at its connection limit.
    Overloaded,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// WebSocket close code sent to the client.
    pub fn close_code(self) -> u16 {
        match self {
            Self::ClientClosed => 1000,
            Self::Shutdown => 1001,
            Self::MalformedMessage => 1007,
            Self::Overloaded => 1013,
            Self::ReadFailure | Self::HeartbeatTimeout | Self::WriteFailure => 1011,
        }
    }

    /// Label used in logs, metrics, and the close frame.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client closed",
            Self::ReadFailure => "read failure",
            Self::MalformedMessage => "malformed message",
            Self::HeartbeatTimeout => "heartbeat timeout",
            Self::WriteFailure => "write failure",
            Self::Overloaded => "server at capacity",
            Self::Shutdown => "server shutting down",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame queued for the connection's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized driver snapshot.
    Snapshot(Utf8Bytes),
    /// Liveness probe.
    Ping,
}

/// A connected WebSocket client, shared between the hub, the dispatcher, the
/// heartbeat monitor, and the connection's own session tasks.
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    /// When the connection was upgraded.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    state: AtomicU8,
    close_reason: Mutex<Option<CloseReason>>,
    cancel: CancellationToken,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection in the `Connecting` state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            close_reason: Mutex::new(None),
            cancel: CancellationToken::new(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Connecting -> Open`. Returns `false` if the connection is past `Connecting`.
    pub fn mark_open(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Open)
    }

    fn mark_active(&self) {
        let _ = self.transition(ConnectionState::Open, ConnectionState::Active);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record inbound activity. Any frame from the client counts as liveness.
    pub fn touch(&self) {
        self.mark_alive();
        self.mark_active();
    }

    /// Queue a serialized snapshot without waiting.
    pub fn send_snapshot(&self, payload: Utf8Bytes) -> Result<(), TransportError> {
        self.enqueue(Outbound::Snapshot(payload))?;
        self.mark_active();
        Ok(())
    }

    /// Queue a liveness probe without waiting.
    pub fn send_ping(&self) -> Result<(), TransportError> {
        self.enqueue(Outbound::Ping)
    }

    fn enqueue(&self, frame: Outbound) -> Result<(), TransportError> {
        if self.is_closing() {
            return Err(TransportError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => TransportError::QueueFull,
                TrySendError::Closed(_) => TransportError::Closed,
            }
        })
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Read and reset the alive flag.
    ///
    /// Returns `true` if the client showed activity since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound frame (or the upgrade).
    pub fn idle(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Move to `Closing` and wake the session tasks.
    ///
    /// Only the first call wins and records its reason; later calls return `false`.
    pub fn begin_close(&self, reason: CloseReason) -> bool {
        let closing = ConnectionState::Closing as u8;
        let won = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s < closing).then_some(closing)
            })
            .is_ok();
        if won {
            *self.close_reason.lock() = Some(reason);
            self.cancel.cancel();
        }
        won
    }

    /// `Closing -> Closed`, or force `Closed` from any state. Terminal.
    pub fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        self.cancel.cancel();
    }

    /// Whether the connection has entered `Closing` or `Closed`.
    pub fn is_closing(&self) -> bool {
        self.state() >= ConnectionState::Closing
    }

    /// Resolves once the connection starts closing.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Reason recorded by the first [`begin_close`](Self::begin_close).
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Frames that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
