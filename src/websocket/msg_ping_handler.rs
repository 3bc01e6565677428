use chrono::Utc;

use crate::models::{to_data, Envelope, MessageType, PongData, SyncError};
use super::session::Session;

/// Handle Ping - send a pong back
pub async fn handle_ping_message(session: &Session, request_id: Option<String>) -> Result<(), SyncError> {
    let pong = Envelope::new(MessageType::Pong, to_data(&PongData { date: Utc::now().to_rfc3339() }))
        .with_id(request_id);
    session.reply(pong).await
}
