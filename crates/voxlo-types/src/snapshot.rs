use serde::{Deserialize, Serialize};

use crate::models::{Identity, IdentityId, Message, RoomId};

/// Flat copy of everything worth keeping across a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub identities: Vec<Identity>,
    pub conversations: Vec<ConversationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub room_id: RoomId,
    pub participants: [IdentityId; 2],
    /// Possibly stale: re-check liveness before use.
    pub messages: Vec<Message>,
}
