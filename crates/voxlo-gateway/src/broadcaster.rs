use std::collections::HashSet;

use tracing::debug;

use voxlo_types::events::ServerEvent;
use voxlo_types::models::{Message, RoomId};

use crate::error::GatewayError;
use crate::hub::HubState;
use crate::registry::ConnId;

pub const MAX_MESSAGE_CHARS: usize = 4000;

impl HubState {
    /// Append a message and fan it out to every handle in the room group,
    /// the sender's own handles included.
    pub(crate) fn send(
        &mut self,
        conn: ConnId,
        room_id: &RoomId,
        text: String,
        client_timestamp: Option<i64>,
        now: i64,
    ) -> Result<Message, GatewayError> {
        let sender = self.sender_of(conn)?;
        if self.conversations.get(room_id).is_none() {
            return Err(GatewayError::RoomNotFound);
        }
        validate_text(&text)?;

        let message = self
            .conversations
            .append(room_id, sender, text, now, client_timestamp)?;

        let recipients = self.registry.group(room_id);
        debug!(
            "Message {} in room {} fanned out to {} connections",
            message.id,
            room_id,
            recipients.len()
        );
        let event = ServerEvent::NewMessage(message.clone());
        for recipient in recipients {
            self.registry.deliver(recipient, event.clone());
        }

        Ok(message)
    }

    /// Relay a typing signal to the room, skipping every handle of the
    /// sender. Nothing is stored.
    pub(crate) fn typing(&self, conn: ConnId, room_id: &RoomId, is_typing: bool) -> Result<(), GatewayError> {
        let sender = self.sender_of(conn)?;
        let conversation = self.conversations.get(room_id).ok_or(GatewayError::RoomNotFound)?;
        if !conversation.has_participant(sender) {
            return Err(GatewayError::ForeignSender);
        }

        let own: HashSet<ConnId> = self.registry.live_handles_of(sender).into_iter().collect();
        let event = ServerEvent::UserTyping {
            room_id: room_id.clone(),
            user_id: sender,
            is_typing,
        };
        for recipient in self.registry.group(room_id) {
            if !own.contains(&recipient) {
                self.registry.deliver(recipient, event.clone());
            }
        }
        Ok(())
    }
}

fn validate_text(text: &str) -> Result<(), GatewayError> {
    if text.trim().is_empty() {
        return Err(GatewayError::InvalidInput("message is empty".into()));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(GatewayError::InvalidInput(format!(
            "message is longer than {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(())
}
