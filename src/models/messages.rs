use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Every message type the sync protocol knows about.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    JoinRoom,
    LeaveRoom,
    ContentUpdate,
    CursorUpdate,
    Presence,
    Ack,
    Error,
    Conflict,
    Ping,
    Pong,
}

impl MessageType {
    pub fn parse(kind: &str) -> Option<Self> {
        let parsed = match kind {
            "join_room" => MessageType::JoinRoom,
            "leave_room" => MessageType::LeaveRoom,
            "content_update" => MessageType::ContentUpdate,
            "cursor_update" => MessageType::CursorUpdate,
            "presence" => MessageType::Presence,
            "ack" => MessageType::Ack,
            "error" => MessageType::Error,
            "conflict" => MessageType::Conflict,
            "ping" => MessageType::Ping,
            "pong" => MessageType::Pong,
            _ => return None,
        };
        Some(parsed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::JoinRoom => "join_room",
            MessageType::LeaveRoom => "leave_room",
            MessageType::ContentUpdate => "content_update",
            MessageType::CursorUpdate => "cursor_update",
            MessageType::Presence => "presence",
            MessageType::Ack => "ack",
            MessageType::Error => "error",
            MessageType::Conflict => "conflict",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
        }
    }
}

/// Live status of a client as seen by its room peers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Away,
    Idle,
}

/// A frame received from a client, before its type has been resolved.
#[derive(Deserialize, Debug)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// A frame sent to a client. Built once per send and never mutated after.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Envelope {
    pub fn new(kind: MessageType, data: Value) -> Self {
        Self {
            kind,
            id: None,
            room_id: None,
            user_id: None,
            username: None,
            timestamp: Utc::now(),
            data,
            error: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        let mut envelope = Self::new(MessageType::Error, Value::Null);
        envelope.error = Some(ErrorPayload {
            code: code.to_string(),
            message: message.into(),
        });
        envelope
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn in_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn from_user(mut self, user_id: impl Into<String>, username: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.username = Some(username.into());
        self
    }

    /// Serialize for the wire. Envelopes only hold JSON-safe values.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// Inbound payloads

/// Document ids are trimmed on the way in so that every handler compares the
/// same string the client was joined under.
fn note_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(de::Error::custom("note_id cannot be empty"));
    }
    Ok(trimmed.to_string())
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JoinRoomData {
    #[serde(deserialize_with = "note_id")]
    pub note_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContentUpdateData {
    #[serde(deserialize_with = "note_id")]
    pub note_id: String,
    pub content: String,
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CursorUpdateData {
    #[serde(deserialize_with = "note_id")]
    pub note_id: String,
    pub position: Value,
    #[serde(default)]
    pub selection: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PresenceData {
    pub status: ClientStatus,
}

// Outbound payloads

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckAction {
    JoinedRoom,
    NoteUpdated,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AckData {
    pub action: AckAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConflictData {
    pub note_id: String,
    pub conflict_id: String,
    pub local_version: i64,
    pub remote_version: i64,
    pub local_content: String,
    pub remote_content: String,
}

/// One entry of the member listing sent to a joining client.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ActiveUser {
    pub client_id: String,
    pub user_id: String,
    pub username: String,
    pub status: ClientStatus,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ActiveUsersData {
    pub active_users: Vec<ActiveUser>,
}

/// Presence change emitted when a member joins, leaves or changes status.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PresenceUpdate {
    pub client_id: String,
    pub status: ClientStatus,
    pub last_seen: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PongData {
    pub date: String,
}

/// Encode a payload struct into the envelope `data` slot.
pub fn to_data<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_type_names_round_trip_through_parse() {
        for kind in [
            MessageType::JoinRoom,
            MessageType::LeaveRoom,
            MessageType::ContentUpdate,
            MessageType::CursorUpdate,
            MessageType::Presence,
            MessageType::Ack,
            MessageType::Error,
            MessageType::Conflict,
            MessageType::Ping,
            MessageType::Pong,
        ] {
            assert_eq!(MessageType::parse(kind.as_str()), Some(kind));
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
        }
        assert_eq!(MessageType::parse("shout"), None);
    }

    #[test]
    fn envelope_skips_empty_optional_fields() {
        let envelope = Envelope::new(MessageType::Pong, Value::Null);
        let value: Value = serde_json::from_str(&envelope.to_text()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.get("type"), Some(&json!("pong")));
        assert!(object.contains_key("timestamp"));
        assert!(!object.contains_key("data"));
        assert!(!object.contains_key("error"));
        assert!(!object.contains_key("room_id"));
    }

    #[test]
    fn error_envelope_carries_code_and_message() {
        let envelope = Envelope::error("not_in_room", "join first").with_id(Some("42".into()));
        let value: Value = serde_json::from_str(&envelope.to_text()).unwrap();
        assert_eq!(value["type"], json!("error"));
        assert_eq!(value["id"], json!("42"));
        assert_eq!(value["error"]["code"], json!("not_in_room"));
        assert_eq!(value["error"]["message"], json!("join first"));
    }

    #[test]
    fn inbound_message_tolerates_missing_data() {
        let inbound: InboundMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(inbound.kind, "ping");
        assert!(inbound.data.is_null());
        assert!(inbound.id.is_none());
    }

    #[test]
    fn content_update_operation_is_optional() {
        let data: ContentUpdateData =
            serde_json::from_value(json!({"note_id": "n", "content": "x", "version": 3})).unwrap();
        assert_eq!(data.version, 3);
        assert!(data.operation.is_none());
    }

    #[test]
    fn note_ids_are_trimmed_and_must_not_be_blank() {
        let join: JoinRoomData = serde_json::from_value(json!({"note_id": "  note-1 "})).unwrap();
        assert_eq!(join.note_id, "note-1");

        let update: ContentUpdateData =
            serde_json::from_value(json!({"note_id": " note-1", "content": "x", "version": 1})).unwrap();
        assert_eq!(update.note_id, "note-1");

        let cursor: CursorUpdateData =
            serde_json::from_value(json!({"note_id": "note-1\t", "position": 4})).unwrap();
        assert_eq!(cursor.note_id, "note-1");

        assert!(serde_json::from_value::<JoinRoomData>(json!({"note_id": "   "})).is_err());
    }
}
