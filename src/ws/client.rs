use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::models::{ActiveUser, ClientStatus, Envelope};

/// Server-generated identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user identity already verified by the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Lifecycle of a registered connection. A disconnected client is no longer
/// in the registry, so there is no variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake done, no traffic seen yet
    Connected,
    /// Inbound traffic seen; refreshed by every frame
    Active,
}

/// Why a client is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Closed,
    ReadTimeout,
    Idle,
    DeliveryFailed,
    TransportError,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            DisconnectReason::Closed => "closed",
            DisconnectReason::ReadTimeout => "read timeout",
            DisconnectReason::Idle => "idle",
            DisconnectReason::DeliveryFailed => "delivery failed",
            DisconnectReason::TransportError => "transport error",
        };
        f.write_str(reason)
    }
}

/// Session state of one connection, owned by the client registry.
///
/// Dropping a `Client` drops its shutdown handle, which ends the connection
/// task. Unregistering is therefore the same thing as closing.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub identity: Identity,
    pub status: ClientStatus,
    pub state: ConnectionState,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub room_id: Option<String>,
    outbound: mpsc::Sender<Envelope>,
    _shutdown: oneshot::Sender<()>,
}

/// Point-in-time copy of a client, safe to hand out of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub id: ClientId,
    pub user_id: String,
    pub username: String,
    pub status: ClientStatus,
    pub state: ConnectionState,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub room_id: Option<String>,
}

impl Client {
    pub fn new(identity: Identity, outbound: mpsc::Sender<Envelope>, shutdown: oneshot::Sender<()>) -> Self {
        let now = Utc::now();
        Self {
            id: ClientId::new(),
            identity,
            status: ClientStatus::Active,
            state: ConnectionState::Connected,
            joined_at: now,
            last_seen: now,
            room_id: None,
            outbound,
            _shutdown: shutdown,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = now;
        self.state = ConnectionState::Active;
    }

    /// Queue an envelope without waiting. A full or closed queue is a
    /// delivery failure for this client only.
    pub fn deliver(&self, envelope: Envelope) -> bool {
        self.outbound.try_send(envelope).is_ok()
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            id: self.id,
            user_id: self.identity.user_id.clone(),
            username: self.identity.username.clone(),
            status: self.status,
            state: self.state,
            joined_at: self.joined_at,
            last_seen: self.last_seen,
            room_id: self.room_id.clone(),
        }
    }

    pub fn as_active_user(&self) -> ActiveUser {
        ActiveUser {
            client_id: self.id.to_string(),
            user_id: self.identity.user_id.clone(),
            username: self.identity.username.clone(),
            status: self.status,
            joined_at: self.joined_at,
            last_seen: self.last_seen,
        }
    }
}
