use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{InboundMessage, MessageType, SyncError};
use super::msg_cursor_handler::handle_cursor_message;
use super::msg_join_handler::{handle_join_message, handle_leave_message};
use super::msg_ping_handler::handle_ping_message;
use super::msg_presence_handler::handle_presence_message;
use super::msg_update_handler::handle_update_message;
use super::session::Session;

/// Handle one text frame from a client.
///
/// Every failure except a dead connection is answered with an `error`
/// envelope and the connection stays open. `Err` means the client's writer
/// is gone and the receive loop should stop.
pub async fn handle_text(session: &Session, text: &str) -> Result<(), SyncError> {
    let inbound: InboundMessage = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!("Failed to parse message from client {}: {}", session.client_id, e);
            return session.reply_error(&SyncError::MalformedMessage(e.to_string()), None).await;
        }
    };

    let request_id = inbound.id.clone();
    match route(session, inbound).await {
        Ok(()) => Ok(()),
        Err(SyncError::ConnectionClosed) => Err(SyncError::ConnectionClosed),
        Err(err) => {
            warn!("Message from client {} rejected ({:?}): {}", session.client_id, err.category(), err);
            session.reply_error(&err, request_id).await
        }
    }
}

async fn route(session: &Session, inbound: InboundMessage) -> Result<(), SyncError> {
    let Some(kind) = MessageType::parse(&inbound.kind) else {
        return Err(SyncError::UnknownMessageType(inbound.kind));
    };
    debug!("Client {} sent {}", session.client_id, kind.as_str());

    let request_id = inbound.id;
    match kind {
        MessageType::JoinRoom => {
            handle_join_message(session, payload(kind, inbound.data)?, request_id).await
        }
        MessageType::LeaveRoom => handle_leave_message(session),
        MessageType::ContentUpdate => {
            handle_update_message(session, payload(kind, inbound.data)?, request_id).await
        }
        MessageType::CursorUpdate => handle_cursor_message(session, inbound.data, request_id),
        MessageType::Presence => handle_presence_message(session, inbound.data),
        MessageType::Ping => handle_ping_message(session, request_id).await,
        // keepalive answer; the frame itself already refreshed last-seen
        MessageType::Pong => Ok(()),
        MessageType::Ack | MessageType::Error | MessageType::Conflict => {
            Err(SyncError::UnknownMessageType(inbound.kind))
        }
    }
}

/// Decode the `data` object of a message of type `kind`.
pub fn payload<T: DeserializeOwned>(kind: MessageType, data: Value) -> Result<T, SyncError> {
    serde_json::from_value(data).map_err(|e| SyncError::InvalidPayload {
        kind: kind.as_str(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentAccess, DocumentStore, MemoryDocumentStore, SaveOutcome, StoreError};
    use crate::models::Envelope;
    use crate::ws::{Client, HubHandle, Identity};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::{mpsc, oneshot};

    struct Harness {
        session: Session,
        rx: mpsc::Receiver<Envelope>,
        store: Arc<MemoryDocumentStore>,
        _shutdown: oneshot::Receiver<()>,
    }

    struct Peer {
        session: Session,
        rx: mpsc::Receiver<Envelope>,
        _shutdown: oneshot::Receiver<()>,
    }

    /// Saves always fail; reads go to the wrapped store.
    struct FailingSaves(Arc<MemoryDocumentStore>);

    #[async_trait::async_trait]
    impl DocumentStore for FailingSaves {
        async fn get_document(&self, id: &str, user_id: &str) -> Result<Option<DocumentAccess>, StoreError> {
            self.0.get_document(id, user_id).await
        }

        async fn save_if_version_matches(&self, _id: &str, _content: &str, _expected: i64) -> Result<SaveOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn connect(hub: &HubHandle, store: Arc<dyn DocumentStore>, user: &str) -> Peer {
        let (tx, rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown) = oneshot::channel();
        let identity = Identity { user_id: user.into(), username: user.to_uppercase() };
        let client = Client::new(identity.clone(), tx.clone(), shutdown_tx);
        let session = Session {
            client_id: client.id,
            identity,
            hub: hub.clone(),
            store,
            outbound: tx,
        };
        hub.register(client);
        Peer { session, rx, _shutdown: shutdown }
    }

    async fn harness() -> Harness {
        let hub = HubHandle::spawn();
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert("note-1", "alice", "hello", 1).await;

        let Peer { session, rx, _shutdown } = connect(&hub, store.clone(), "alice");
        Harness { session, rx, store, _shutdown }
    }

    async fn next(rx: &mut mpsc::Receiver<Envelope>) -> Envelope {
        tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a reply")
            .expect("channel closed")
    }

    fn error_code(envelope: &Envelope) -> Option<&str> {
        envelope.error.as_ref().map(|e| e.code.as_str())
    }

    #[tokio::test]
    async fn malformed_json_yields_invalid_message() {
        let mut h = harness().await;
        handle_text(&h.session, "{not json").await.unwrap();
        let reply = next(&mut h.rx).await;
        assert_eq!(reply.kind, MessageType::Error);
        assert_eq!(error_code(&reply), Some("invalid_message"));
    }

    #[tokio::test]
    async fn unknown_type_yields_error_and_echoes_id() {
        let mut h = harness().await;
        handle_text(&h.session, r#"{"type":"shout","id":"7"}"#).await.unwrap();
        let reply = next(&mut h.rx).await;
        assert_eq!(error_code(&reply), Some("unknown_message_type"));
        assert_eq!(reply.id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn server_originated_types_are_refused() {
        let mut h = harness().await;
        handle_text(&h.session, r#"{"type":"conflict","data":{}}"#).await.unwrap();
        assert_eq!(error_code(&next(&mut h.rx).await), Some("unknown_message_type"));
    }

    #[tokio::test]
    async fn bad_payload_yields_invalid_payload() {
        let mut h = harness().await;
        handle_text(&h.session, r#"{"type":"join_room","data":{"note":"x"}}"#).await.unwrap();
        assert_eq!(error_code(&next(&mut h.rx).await), Some("invalid_payload"));
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let mut h = harness().await;
        handle_text(&h.session, r#"{"type":"ping","id":"p1"}"#).await.unwrap();
        let reply = next(&mut h.rx).await;
        assert_eq!(reply.kind, MessageType::Pong);
        assert_eq!(reply.id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn join_of_inaccessible_document_is_not_found() {
        let mut h = harness().await;
        h.store.insert("secret", "mallory", "", 1).await;

        handle_text(&h.session, r#"{"type":"join_room","data":{"note_id":"secret"}}"#).await.unwrap();
        assert_eq!(error_code(&next(&mut h.rx).await), Some("document_not_found"));
        handle_text(&h.session, r#"{"type":"join_room","data":{"note_id":"missing"}}"#).await.unwrap();
        assert_eq!(error_code(&next(&mut h.rx).await), Some("document_not_found"));
        assert_eq!(h.session.hub.room_of(h.session.client_id).await, None);
    }

    #[tokio::test]
    async fn update_then_stale_update_conflicts() {
        let mut h = harness().await;
        handle_text(&h.session, r#"{"type":"join_room","data":{"note_id":"note-1"}}"#).await.unwrap();
        assert_eq!(next(&mut h.rx).await.kind, MessageType::Ack);
        next(&mut h.rx).await; // member listing

        let edit = json!({"type": "content_update", "id": "e1",
            "data": {"note_id": "note-1", "content": "X", "version": 1}});
        handle_text(&h.session, &edit.to_string()).await.unwrap();
        let ack = next(&mut h.rx).await;
        assert_eq!(ack.kind, MessageType::Ack);
        assert_eq!(ack.id.as_deref(), Some("e1"));
        assert_eq!(ack.data["action"], json!("note_updated"));
        assert_eq!(ack.data["version"], json!(2));

        let stale = json!({"type": "content_update",
            "data": {"note_id": "note-1", "content": "Y", "version": 1}});
        handle_text(&h.session, &stale.to_string()).await.unwrap();
        let conflict = next(&mut h.rx).await;
        assert_eq!(conflict.kind, MessageType::Conflict);
        assert_eq!(conflict.data["local_version"], json!(1));
        assert_eq!(conflict.data["remote_version"], json!(2));
        assert_eq!(conflict.data["local_content"], json!("Y"));
        assert_eq!(conflict.data["remote_content"], json!("X"));
        assert!(conflict.data["conflict_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(h.store.snapshot("note-1").await, Some(("X".to_string(), 2)));
    }

    #[tokio::test]
    async fn update_outside_room_is_refused() {
        let mut h = harness().await;
        let edit = json!({"type": "content_update",
            "data": {"note_id": "note-1", "content": "X", "version": 1}});
        handle_text(&h.session, &edit.to_string()).await.unwrap();
        assert_eq!(error_code(&next(&mut h.rx).await), Some("not_in_room"));
        assert_eq!(h.store.snapshot("note-1").await, Some(("hello".to_string(), 1)));
    }

    #[tokio::test]
    async fn padded_note_id_is_the_same_room_everywhere() {
        let mut h = harness().await;
        handle_text(&h.session, r#"{"type":"join_room","data":{"note_id":" note-1"}}"#).await.unwrap();
        let ack = next(&mut h.rx).await;
        assert_eq!(ack.data["room_id"], json!("note-1"));
        next(&mut h.rx).await; // member listing

        let edit = json!({"type": "content_update",
            "data": {"note_id": " note-1", "content": "X", "version": 1}});
        handle_text(&h.session, &edit.to_string()).await.unwrap();
        let reply = next(&mut h.rx).await;
        assert_eq!(reply.kind, MessageType::Ack, "unexpected reply {:?}", reply.error);
        assert_eq!(h.store.snapshot("note-1").await, Some(("X".to_string(), 2)));

        // a refused relay would come back as an error envelope
        handle_text(&h.session, r#"{"type":"cursor_update","data":{"note_id":"note-1 ","position":0}}"#).await.unwrap();
        h.session.hub.stats().await;
        assert!(h.rx.try_recv().is_err());

        handle_text(&h.session, r#"{"type":"join_room","data":{"note_id":"  "}}"#).await.unwrap();
        assert_eq!(error_code(&next(&mut h.rx).await), Some("invalid_payload"));
    }

    #[tokio::test]
    async fn failed_save_is_reported_to_the_sender_only() {
        let hub = HubHandle::spawn();
        let memory = Arc::new(MemoryDocumentStore::new());
        memory.insert("note-1", "alice", "hello", 1).await;
        memory.grant("note-1", "bob").await;
        let store: Arc<dyn DocumentStore> = Arc::new(FailingSaves(memory.clone()));

        let mut bob = connect(&hub, store.clone(), "bob");
        let mut alice = connect(&hub, store, "alice");

        handle_text(&bob.session, r#"{"type":"join_room","data":{"note_id":"note-1"}}"#).await.unwrap();
        next(&mut bob.rx).await; // ack
        next(&mut bob.rx).await; // member listing
        handle_text(&alice.session, r#"{"type":"join_room","data":{"note_id":"note-1"}}"#).await.unwrap();
        next(&mut alice.rx).await; // ack
        next(&mut alice.rx).await; // member listing
        assert_eq!(next(&mut bob.rx).await.kind, MessageType::Presence);

        let edit = json!({"type": "content_update", "id": "e1",
            "data": {"note_id": "note-1", "content": "lost", "version": 1}});
        handle_text(&alice.session, &edit.to_string()).await.unwrap();
        let reply = next(&mut alice.rx).await;
        assert_eq!(error_code(&reply), Some("persistence_error"));
        assert_eq!(reply.id.as_deref(), Some("e1"));

        // the hub has drained everything queued before this answer
        hub.stats().await;
        assert!(alice.rx.try_recv().is_err());
        assert!(bob.rx.try_recv().is_err());
        assert_eq!(memory.snapshot("note-1").await, Some(("hello".to_string(), 1)));
    }
}
