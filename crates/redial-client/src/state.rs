//! Connection state tracking for the reconnect loop.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built but `connect` has not been called.
    Created,

    /// Dialing the remote.
    Connecting,

    /// A connection is established and the session is running.
    Connected,

    /// The last connection ended; waiting before the next dial.
    Disconnected,

    /// The loop has exited and will not dial again.
    Terminated,
}

impl ConnectionState {
    fn encode(self) -> u8 {
        match self {
            ConnectionState::Created => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Disconnected => 3,
            ConnectionState::Terminated => 4,
        }
    }

    fn decode(encoded: u8) -> Self {
        match encoded {
            0 => ConnectionState::Created,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnected,
            _ => ConnectionState::Terminated,
        }
    }
}

/// Shared state of one client.
#[derive(Clone)]
pub struct ClientState {
    state: Arc<AtomicU8>,

    /// Consecutive failed attempts since the last successful connection.
    attempts: Arc<AtomicU32>,

    /// Successful connections over the client's lifetime.
    connections: Arc<AtomicU32>,
}

impl ClientState {
    /// Creates a state in [`ConnectionState::Created`].
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ConnectionState::Created.encode())),
            attempts: Arc::new(AtomicU32::new(0)),
            connections: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::decode(self.state.load(Ordering::Acquire))
    }

    /// Moves to `next` and returns the previous state.
    ///
    /// `Terminated` is final: once reached, further transitions are ignored
    /// and `Terminated` is returned.
    pub fn transition(&self, next: ConnectionState) -> ConnectionState {
        let next = next.encode();
        let terminated = ConnectionState::Terminated.encode();
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != terminated).then_some(next)
            })
            .unwrap_or(terminated);
        ConnectionState::decode(previous)
    }

    /// Returns the number of consecutive failed attempts.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Increments and returns the attempt number.
    pub fn increment_attempts(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Returns the number of successful connections so far.
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::Acquire)
    }

    /// Records a successful connection and resets the attempt counter.
    pub fn mark_connected(&self) -> ConnectionState {
        self.attempts.store(0, Ordering::Release);
        self.connections.fetch_add(1, Ordering::AcqRel);
        self.transition(ConnectionState::Connected)
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .field("connections", &self.connections())
            .finish()
    }
}
