use std::sync::Arc;
use tokio::sync::mpsc;

use crate::db::DocumentStore;
use crate::models::{Envelope, SyncError};
use crate::ws::{ClientId, HubHandle, Identity};

/// What a connection's message handlers need to act on behalf of one client.
#[derive(Clone)]
pub struct Session {
    pub client_id: ClientId,
    pub identity: Identity,
    pub hub: HubHandle,
    pub store: Arc<dyn DocumentStore>,
    pub outbound: mpsc::Sender<Envelope>,
}

impl Session {
    /// Send a direct reply to this client. Fails only if its writer is gone.
    pub async fn reply(&self, envelope: Envelope) -> Result<(), SyncError> {
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| SyncError::ConnectionClosed)
    }

    pub async fn reply_error(&self, err: &SyncError, request_id: Option<String>) -> Result<(), SyncError> {
        self.reply(Envelope::error(err.code(), err.client_message()).with_id(request_id))
            .await
    }

    /// An envelope stamped with this client's identity.
    pub fn envelope(&self, envelope: Envelope) -> Envelope {
        envelope.from_user(&self.identity.user_id, &self.identity.username)
    }
}
