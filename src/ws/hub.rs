use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::models::{
    to_data, AckAction, AckData, ActiveUsersData, ClientStatus, Envelope, HubStats, MessageType,
    PresenceUpdate, SyncError,
};
use super::client::{Client, ClientId, DisconnectReason, Identity};
use super::registry::ClientRegistry;
use super::room::{Departure, RoomManager};

/// Requests processed, in order, by the hub task.
#[derive(Debug)]
pub enum HubCommand {
    Register(Client),
    Touch(ClientId),
    Join { client_id: ClientId, room_id: String, request_id: Option<String> },
    Leave { client_id: ClientId },
    Presence { client_id: ClientId, status: ClientStatus, data: Value },
    /// Forward to the sender's room; the sender must be a member of `room_id`.
    Relay { client_id: ClientId, room_id: String, envelope: Envelope, request_id: Option<String> },
    /// Deliver to every member of `room_id` except `exclude`.
    Broadcast { room_id: String, exclude: Option<ClientId>, envelope: Envelope },
    Disconnect { client_id: ClientId, reason: DisconnectReason },
    Reap { idle_timeout: Duration },
    RoomOf { client_id: ClientId, reply: oneshot::Sender<Option<String>> },
    Stats { reply: oneshot::Sender<HubStats> },
}

/// All live session state: the client registry and the room table.
///
/// Only the hub task touches this, one command at a time, so membership and
/// registry updates are atomic with respect to each other without locks.
#[derive(Debug, Default)]
pub struct HubState {
    registry: ClientRegistry,
    rooms: RoomManager,
    /// Recipients whose outbound queue rejected a message
    failed: Vec<ClientId>,
}

impl HubState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn handle(&mut self, command: HubCommand) {
        let now = Utc::now();
        match command {
            HubCommand::Register(client) => self.register(client),
            HubCommand::Touch(client_id) => self.touch(client_id, now),
            HubCommand::Join { client_id, room_id, request_id } => self.join(client_id, &room_id, request_id, now),
            HubCommand::Leave { client_id } => self.leave(client_id, now),
            HubCommand::Presence { client_id, status, data } => self.set_presence(client_id, status, data, now),
            HubCommand::Relay { client_id, room_id, envelope, request_id } => {
                self.relay(client_id, &room_id, envelope, request_id)
            }
            HubCommand::Broadcast { room_id, exclude, envelope } => self.broadcast(&room_id, exclude, envelope),
            HubCommand::Disconnect { client_id, reason } => {
                self.disconnect(client_id, reason, now);
            }
            HubCommand::Reap { idle_timeout } => {
                let threshold = TimeDelta::from_std(idle_timeout).unwrap_or(TimeDelta::MAX);
                self.reap(now, threshold);
            }
            HubCommand::RoomOf { client_id, reply } => {
                let _ = reply.send(self.room_of(client_id));
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    pub fn register(&mut self, client: Client) {
        info!("Client {} registered for user {}", client.id, client.identity.user_id);
        self.registry.register(client);
    }

    pub fn touch(&mut self, client_id: ClientId, now: DateTime<Utc>) {
        if let Some(client) = self.registry.get_mut(client_id) {
            client.touch(now);
        }
    }

    /// Attach a client to a document room. Access must already be checked.
    pub fn join(&mut self, client_id: ClientId, room_id: &str, request_id: Option<String>, now: DateTime<Utc>) {
        let Some(client) = self.registry.get(client_id) else {
            debug!("Join from unknown client {} ignored", client_id);
            return;
        };

        let already_here = client.room_id.as_deref() == Some(room_id);
        if !already_here && client.room_id.is_some() {
            self.leave(client_id, now);
        }

        let created = self.rooms.add_member(room_id, client_id, now);
        if created {
            info!("Room {} created", room_id);
        }

        let Some(client) = self.registry.get_mut(client_id) else {
            return;
        };
        client.room_id = Some(room_id.to_string());
        client.status = ClientStatus::Active;
        client.touch(now);
        let identity = client.identity.clone();
        let presence = PresenceUpdate {
            client_id: client_id.to_string(),
            status: ClientStatus::Active,
            last_seen: now,
        };

        let ack = Envelope::new(MessageType::Ack, to_data(&AckData {
            action: AckAction::JoinedRoom,
            room_id: Some(room_id.to_string()),
            note_id: None,
            version: None,
        }))
        .in_room(room_id)
        .from_user(&identity.user_id, &identity.username)
        .with_id(request_id);
        self.deliver(client_id, ack);

        let active_users = self
            .rooms
            .members(room_id)
            .into_iter()
            .filter(|member| *member != client_id)
            .filter_map(|member| self.registry.get(member).map(Client::as_active_user))
            .collect();
        let listing = Envelope::new(MessageType::Presence, to_data(&ActiveUsersData { active_users }))
            .in_room(room_id)
            .from_user(&identity.user_id, &identity.username);
        self.deliver(client_id, listing);

        if !already_here {
            info!("Client {} ({}) joined room {}", client_id, identity.user_id, room_id);
            let update = Envelope::new(MessageType::Presence, to_data(&presence))
                .in_room(room_id)
                .from_user(&identity.user_id, &identity.username);
            self.fan_out(room_id, Some(client_id), update);
        }

        self.flush_failed(now);
    }

    /// Detach a client from its current room. Not being in a room is fine.
    pub fn leave(&mut self, client_id: ClientId, now: DateTime<Utc>) {
        let Some(client) = self.registry.get_mut(client_id) else {
            return;
        };
        let Some(room_id) = client.room_id.take() else {
            return;
        };
        let identity = client.identity.clone();
        self.depart(client_id, &identity, &room_id, now);
        self.flush_failed(now);
    }

    /// Record a status change and tell the rest of the room.
    pub fn set_presence(&mut self, client_id: ClientId, status: ClientStatus, data: Value, now: DateTime<Utc>) {
        let Some(client) = self.registry.get_mut(client_id) else {
            return;
        };
        client.status = status;
        client.touch(now);
        let Some(room_id) = client.room_id.clone() else {
            return;
        };
        let envelope = Envelope::new(MessageType::Presence, data)
            .in_room(&room_id)
            .from_user(&client.identity.user_id, &client.identity.username);
        self.fan_out(&room_id, Some(client_id), envelope);
        self.flush_failed(now);
    }

    pub fn relay(&mut self, client_id: ClientId, room_id: &str, envelope: Envelope, request_id: Option<String>) {
        if !self.rooms.is_member(room_id, client_id) {
            let err = SyncError::NotInRoom(room_id.to_string());
            warn!("Client {} relayed to {} without membership", client_id, room_id);
            self.deliver(client_id, Envelope::error(err.code(), err.client_message()).with_id(request_id));
        } else {
            self.fan_out(room_id, Some(client_id), envelope);
        }
        self.flush_failed(Utc::now());
    }

    pub fn broadcast(&mut self, room_id: &str, exclude: Option<ClientId>, envelope: Envelope) {
        self.fan_out(room_id, exclude, envelope);
        self.flush_failed(Utc::now());
    }

    /// Tear a client down: unregister, leave its room, tell the room.
    ///
    /// Returns false if the client was already gone, in which case nothing
    /// happens. Dropping the record closes the connection.
    pub fn disconnect(&mut self, client_id: ClientId, reason: DisconnectReason, now: DateTime<Utc>) -> bool {
        let removed = self.disconnect_one(client_id, reason, now);
        self.flush_failed(now);
        removed
    }

    /// Disconnect every client silent for longer than `threshold`.
    pub fn reap(&mut self, now: DateTime<Utc>, threshold: TimeDelta) -> Vec<ClientId> {
        let stale: Vec<ClientId> = self
            .registry
            .list()
            .into_iter()
            .filter(|client| now.signed_duration_since(client.last_seen) > threshold)
            .map(|client| client.id)
            .collect();

        for client_id in &stale {
            self.disconnect(*client_id, DisconnectReason::Idle, now);
        }
        if !stale.is_empty() {
            info!("Reaped {} idle client(s)", stale.len());
        }
        stale
    }

    pub fn room_of(&self, client_id: ClientId) -> Option<String> {
        self.registry.get(client_id).and_then(|client| client.room_id.clone())
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            total_rooms: self.rooms.len(),
            total_clients: self.registry.len(),
            rooms: self.rooms.stats(),
        }
    }

    fn disconnect_one(&mut self, client_id: ClientId, reason: DisconnectReason, now: DateTime<Utc>) -> bool {
        let Some(client) = self.registry.unregister(client_id) else {
            return false;
        };
        info!("Client {} ({}) disconnected: {}", client_id, client.identity.user_id, reason);
        if let Some(room_id) = &client.room_id {
            self.depart(client_id, &client.identity, room_id, now);
        }
        true
    }

    fn depart(&mut self, client_id: ClientId, identity: &Identity, room_id: &str, now: DateTime<Utc>) {
        match self.rooms.remove_member(room_id, client_id, now) {
            Departure::NotMember => {
                debug!("Client {} was no longer in room {}", client_id, room_id);
                return;
            }
            Departure::Left => {}
            Departure::RoomClosed => info!("Room {} closed", room_id),
        }

        let update = Envelope::new(MessageType::Presence, to_data(&PresenceUpdate {
            client_id: client_id.to_string(),
            status: ClientStatus::Away,
            last_seen: now,
        }))
        .in_room(room_id)
        .from_user(&identity.user_id, &identity.username);
        self.fan_out(room_id, Some(client_id), update);
    }

    fn deliver(&mut self, client_id: ClientId, envelope: Envelope) {
        if let Some(client) = self.registry.get(client_id) {
            if !client.deliver(envelope) {
                self.failed.push(client_id);
            }
        }
    }

    fn fan_out(&mut self, room_id: &str, exclude: Option<ClientId>, envelope: Envelope) {
        for member in self.rooms.members(room_id) {
            if Some(member) == exclude {
                continue;
            }
            if let Some(client) = self.registry.get(member) {
                if !client.deliver(envelope.clone()) {
                    warn!("Delivery to client {} in room {} failed", member, room_id);
                    self.failed.push(member);
                }
            }
        }
    }

    /// Disconnect recipients that could not be reached. Their own departure
    /// notices may fail further recipients, hence the loop.
    fn flush_failed(&mut self, now: DateTime<Utc>) {
        while let Some(client_id) = self.failed.pop() {
            self.disconnect_one(client_id, DisconnectReason::DeliveryFailed, now);
        }
    }

    /// Every client's room lists it, and every room member is a registered
    /// client pointing back at that room. No room is empty.
    #[cfg(test)]
    pub fn check_invariants(&self) {
        for snapshot in self.registry.list() {
            if let Some(room_id) = &snapshot.room_id {
                assert!(
                    self.rooms.is_member(room_id, snapshot.id),
                    "client {} points at room {} which does not list it",
                    snapshot.id,
                    room_id
                );
            }
        }
        for room in self.rooms.rooms() {
            assert!(!room.members.is_empty(), "room {} exists with no members", room.id);
            for member in &room.members {
                let client = self.registry.get(*member).expect("room member must be registered");
                assert_eq!(client.room_id.as_deref(), Some(room.id.as_str()));
            }
        }
    }
}

/// Cloneable entry point to the hub task.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Start the hub task and return a handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { tx }
    }

    fn send(&self, command: HubCommand) {
        if self.tx.send(command).is_err() {
            warn!("Hub is not running, command dropped");
        }
    }

    pub fn register(&self, client: Client) {
        self.send(HubCommand::Register(client));
    }

    pub fn touch(&self, client_id: ClientId) {
        self.send(HubCommand::Touch(client_id));
    }

    pub fn join(&self, client_id: ClientId, room_id: String, request_id: Option<String>) {
        self.send(HubCommand::Join { client_id, room_id, request_id });
    }

    pub fn leave(&self, client_id: ClientId) {
        self.send(HubCommand::Leave { client_id });
    }

    pub fn presence(&self, client_id: ClientId, status: ClientStatus, data: Value) {
        self.send(HubCommand::Presence { client_id, status, data });
    }

    pub fn relay(&self, client_id: ClientId, room_id: String, envelope: Envelope, request_id: Option<String>) {
        self.send(HubCommand::Relay { client_id, room_id, envelope, request_id });
    }

    pub fn broadcast(&self, room_id: String, exclude: Option<ClientId>, envelope: Envelope) {
        self.send(HubCommand::Broadcast { room_id, exclude, envelope });
    }

    pub fn disconnect(&self, client_id: ClientId, reason: DisconnectReason) {
        self.send(HubCommand::Disconnect { client_id, reason });
    }

    pub fn reap(&self, idle_timeout: Duration) {
        self.send(HubCommand::Reap { idle_timeout });
    }

    pub async fn room_of(&self, client_id: ClientId) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::RoomOf { client_id, reply });
        rx.await.ok().flatten()
    }

    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply });
        rx.await.unwrap_or_default()
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<HubCommand>) {
    info!("Hub started");
    let mut state = HubState::new();
    while let Some(command) = rx.recv().await {
        state.handle(command);
    }
    info!("Hub stopped");
}
