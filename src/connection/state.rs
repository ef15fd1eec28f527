//! Connection state and lifecycle events.

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Connection State ==
/// Lifecycle state of the shared store connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Reconnecting,
    /// Terminal until an explicit `connect()`
    Exhausted,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Exhausted => "exhausted",
        }
    }

    /// True while a (re)connection sequence is running.
    pub fn is_transitional(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Lifecycle Events ==
/// Notifications published for observability collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected { reason: String },
    Error { attempt: u32, message: String },
    Reconnecting { attempt: u32, delay_ms: u64 },
    Reconnected,
    Exhausted { attempts: u32 },
}

// == Connection Info ==
/// Snapshot served to health-check endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub endpoint: String,
    /// Consecutive failures in the current sequence
    pub attempt: u32,
    /// Successful reconnections since the manager was created
    pub reconnects: u64,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
