use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::models::RoomStats;
use super::client::ClientId;

/// Clients attached to one document. Never exists with zero members.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub members: BTreeSet<ClientId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of removing a member from a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Room or membership was already gone
    NotMember,
    Left,
    /// Last member left and the room was deleted
    RoomClosed,
}

/// Document id to room table.
#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: HashMap<String, Room>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member, creating the room on first join. Returns true if the room was created.
    pub fn add_member(&mut self, room_id: &str, client_id: ClientId, now: DateTime<Utc>) -> bool {
        let mut created = false;
        let room = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            created = true;
            Room {
                id: room_id.to_string(),
                members: BTreeSet::new(),
                created_at: now,
                updated_at: now,
            }
        });
        room.members.insert(client_id);
        room.updated_at = now;
        created
    }

    /// Remove a member; the room is deleted in the same step if it empties.
    pub fn remove_member(&mut self, room_id: &str, client_id: ClientId, now: DateTime<Utc>) -> Departure {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Departure::NotMember;
        };
        if !room.members.remove(&client_id) {
            return Departure::NotMember;
        }
        if room.members.is_empty() {
            self.rooms.remove(room_id);
            return Departure::RoomClosed;
        }
        room.updated_at = now;
        Departure::Left
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn is_member(&self, room_id: &str, client_id: ClientId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|room| room.members.contains(&client_id))
    }

    /// Members of a room, empty if the room does not exist.
    pub fn members(&self, room_id: &str) -> Vec<ClientId> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Member counts per room, sorted by room id.
    pub fn stats(&self) -> Vec<RoomStats> {
        let mut stats: Vec<RoomStats> = self
            .rooms
            .values()
            .map(|room| RoomStats { room_id: room.id.clone(), members: room.members.len() })
            .collect();
        stats.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        stats
    }
}
