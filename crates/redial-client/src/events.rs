use crate::state::ConnectionState;
use redial_core::events::RedialEvent;
use std::time::{Duration, Instant};

/// Events emitted by a client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The connection state changed.
    StateTransition {
        name: String,
        timestamp: Instant,
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A dial is about to start.
    Dialing {
        name: String,
        timestamp: Instant,
        remote: String,
        attempt: u32,
    },
    /// A connection was established and accepted by `on_connect`.
    Connected {
        name: String,
        timestamp: Instant,
        peer_addr: String,
    },
    /// The session ended and the connection was closed.
    Disconnected {
        name: String,
        timestamp: Instant,
        uptime: Duration,
        error: Option<String>,
    },
    /// The waiter was consulted before the next attempt.
    Reconnecting {
        name: String,
        timestamp: Instant,
        attempt: u32,
        error: String,
    },
    /// The loop exited.
    Terminated {
        name: String,
        timestamp: Instant,
        error: Option<String>,
    },
}

impl RedialEvent for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::StateTransition { .. } => "StateTransition",
            ClientEvent::Dialing { .. } => "Dialing",
            ClientEvent::Connected { .. } => "Connected",
            ClientEvent::Disconnected { .. } => "Disconnected",
            ClientEvent::Reconnecting { .. } => "Reconnecting",
            ClientEvent::Terminated { .. } => "Terminated",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ClientEvent::StateTransition { timestamp, .. }
            | ClientEvent::Dialing { timestamp, .. }
            | ClientEvent::Connected { timestamp, .. }
            | ClientEvent::Disconnected { timestamp, .. }
            | ClientEvent::Reconnecting { timestamp, .. }
            | ClientEvent::Terminated { timestamp, .. } => *timestamp,
        }
    }

    fn source_name(&self) -> &str {
        match self {
            ClientEvent::StateTransition { name, .. }
            | ClientEvent::Dialing { name, .. }
            | ClientEvent::Connected { name, .. }
            | ClientEvent::Disconnected { name, .. }
            | ClientEvent::Reconnecting { name, .. }
            | ClientEvent::Terminated { name, .. } => name,
        }
    }
}
