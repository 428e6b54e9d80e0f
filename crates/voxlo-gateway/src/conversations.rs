use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};
use uuid::Uuid;

use voxlo_types::models::{IdentityId, Message, RoomId, is_live};
use voxlo_types::snapshot::ConversationRecord;

use crate::error::GatewayError;

/// A two-party conversation. Never destroyed; its message log decays.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub room_id: RoomId,
    pub participants: [IdentityId; 2],
    messages: Vec<Message>,
}

impl Conversation {
    fn new(a: IdentityId, b: IdentityId) -> Self {
        Self {
            room_id: RoomId::for_pair(a, b),
            participants: [a, b],
            messages: Vec::new(),
        }
    }

    pub fn has_participant(&self, id: IdentityId) -> bool {
        self.participants.contains(&id)
    }

    pub fn partner_of(&self, id: IdentityId) -> Option<IdentityId> {
        match self.participants {
            [a, b] if a == id => Some(b),
            [a, b] if b == id => Some(a),
            _ => None,
        }
    }

    /// Messages still inside their TTL at `now`, in send order.
    pub fn live_messages(&self, now: i64) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.is_live(now))
            .cloned()
            .collect()
    }

    /// Number of stored messages, dead ones included.
    pub fn stored_len(&self) -> usize {
        self.messages.len()
    }

    fn prune(&mut self, now: i64) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| is_live(m.sent_at, now));
        before - self.messages.len()
    }

    pub fn to_record(&self) -> ConversationRecord {
        ConversationRecord {
            room_id: self.room_id.clone(),
            participants: self.participants,
            messages: self.messages.clone(),
        }
    }
}

/// Conversations keyed by room id, plus an index of rooms per identity.
#[derive(Debug, Default)]
pub struct ConversationStore {
    rooms: HashMap<RoomId, Conversation>,
    by_identity: HashMap<IdentityId, BTreeSet<RoomId>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pair's conversation, creating an empty one the first
    /// time. The flag reports whether it was created by this call.
    pub fn get_or_create(&mut self, a: IdentityId, b: IdentityId) -> (&Conversation, bool) {
        let room_id = RoomId::for_pair(a, b);
        let created = !self.rooms.contains_key(&room_id);
        if created {
            self.insert(Conversation::new(a, b));
        }
        (&self.rooms[&room_id], created)
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&Conversation> {
        self.rooms.get(room_id)
    }

    /// Append a message and opportunistically drop anything that expired.
    pub fn append(
        &mut self,
        room_id: &RoomId,
        sender_id: IdentityId,
        text: String,
        sent_at: i64,
        client_timestamp: Option<i64>,
    ) -> Result<Message, GatewayError> {
        let conversation = self.rooms.get_mut(room_id).ok_or(GatewayError::RoomNotFound)?;
        if !conversation.has_participant(sender_id) {
            return Err(GatewayError::ForeignSender);
        }

        let message = Message {
            id: Uuid::now_v7(),
            sender_id,
            room_id: room_id.clone(),
            text,
            sent_at,
            client_timestamp,
        };
        conversation.messages.push(message.clone());
        conversation.prune(sent_at);

        Ok(message)
    }

    /// Pure read: filters to live messages without touching the log.
    pub fn live_messages(&self, room_id: &RoomId, now: i64) -> Result<Vec<Message>, GatewayError> {
        self.rooms
            .get(room_id)
            .map(|c| c.live_messages(now))
            .ok_or(GatewayError::RoomNotFound)
    }

    /// Drop dead messages from one room's stored log. Idempotent.
    pub fn compact(&mut self, room_id: &RoomId, now: i64) -> usize {
        self.rooms.get_mut(room_id).map_or(0, |c| c.prune(now))
    }

    /// Compact every room. Conversations themselves are never removed.
    pub fn compact_all(&mut self, now: i64) -> usize {
        let removed: usize = self.rooms.values_mut().map(|c| c.prune(now)).sum();
        if removed > 0 {
            debug!("Compaction dropped {} expired messages", removed);
        }
        removed
    }

    pub fn rooms_of(&self, id: IdentityId) -> impl Iterator<Item = &Conversation> {
        self.by_identity
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|room_id| self.rooms.get(room_id))
    }

    /// Load a persisted conversation. Its messages are re-checked against
    /// the TTL; being persisted says nothing about being live.
    pub fn restore(&mut self, record: ConversationRecord, now: i64) {
        let [a, b] = record.participants;
        let room_id = RoomId::for_pair(a, b);
        if room_id != record.room_id {
            warn!(
                "Stored room id '{}' does not match its participants, using '{}'",
                record.room_id, room_id
            );
        }

        let mut conversation = Conversation::new(a, b);
        conversation.messages = record
            .messages
            .into_iter()
            .filter(|m| m.is_live(now))
            .map(|mut m| {
                m.room_id = room_id.clone();
                m
            })
            .collect();
        self.insert(conversation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn insert(&mut self, conversation: Conversation) {
        for id in conversation.participants {
            self.by_identity
                .entry(id)
                .or_default()
                .insert(conversation.room_id.clone());
        }
        self.rooms.insert(conversation.room_id.clone(), conversation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn get_or_create_is_one_per_pair() {
        let mut store = ConversationStore::new();
        let a = IdentityId::new();
        let b = IdentityId::new();

        let (first, created) = store.get_or_create(a, b);
        let room_id = first.room_id.clone();
        assert!(created);

        let (second, created) = store.get_or_create(b, a);
        assert!(!created);
        assert_eq!(second.room_id, room_id);
        assert_eq!(store.len(), 1);
        assert_eq!(store.rooms_of(a).count(), 1);
        assert_eq!(store.rooms_of(b).count(), 1);
    }

    #[test]
    fn append_rejects_outsiders_and_unknown_rooms() {
        let mut store = ConversationStore::new();
        let a = IdentityId::new();
        let b = IdentityId::new();
        let room_id = store.get_or_create(a, b).0.room_id.clone();

        let err = store
            .append(&room_id, IdentityId::new(), "hi".into(), T0, None)
            .unwrap_err();
        assert_eq!(err, GatewayError::ForeignSender);

        let err = store
            .append(&RoomId::from("nope"), a, "hi".into(), T0, None)
            .unwrap_err();
        assert_eq!(err, GatewayError::RoomNotFound);

        let msg = store.append(&room_id, a, "hi".into(), T0, Some(T0 - 5)).unwrap();
        assert_eq!(msg.sender_id, a);
        assert_eq!(msg.room_id, room_id);
    }

    #[test]
    fn live_messages_respect_ttl_boundary() {
        let mut store = ConversationStore::new();
        let a = IdentityId::new();
        let b = IdentityId::new();
        let room_id = store.get_or_create(a, b).0.room_id.clone();

        let now = T0 + 600_001;
        store.append(&room_id, a, "old".into(), now - 600_001, None).unwrap();
        store.append(&room_id, b, "fresh".into(), now - 599_999, None).unwrap();

        let live = store.live_messages(&room_id, now).unwrap();
        let texts: Vec<_> = live.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["fresh"]);

        // Reads never mutate the log.
        assert_eq!(store.get(&room_id).unwrap().stored_len(), 2);
    }

    #[test]
    fn compaction_keeps_the_conversation() {
        let mut store = ConversationStore::new();
        let a = IdentityId::new();
        let b = IdentityId::new();
        let room_id = store.get_or_create(a, b).0.room_id.clone();
        store.append(&room_id, a, "hi".into(), T0, None).unwrap();

        assert_eq!(store.compact_all(T0 + 599_000), 0);
        assert_eq!(store.compact_all(T0 + 600_000), 1);
        assert_eq!(store.compact(&room_id, T0 + 700_000), 0);
        assert_eq!(store.len(), 1);
        assert!(store.live_messages(&room_id, T0 + 700_000).unwrap().is_empty());
    }

    #[test]
    fn append_prunes_expired_messages() {
        let mut store = ConversationStore::new();
        let a = IdentityId::new();
        let b = IdentityId::new();
        let room_id = store.get_or_create(a, b).0.room_id.clone();

        store.append(&room_id, a, "old".into(), T0, None).unwrap();
        store.append(&room_id, b, "new".into(), T0 + 600_000, None).unwrap();
        assert_eq!(store.get(&room_id).unwrap().stored_len(), 1);
    }

    #[test]
    fn restore_refilters_stale_messages() {
        let a = IdentityId::new();
        let b = IdentityId::new();
        let room_id = RoomId::for_pair(a, b);
        let msg = |text: &str, sent_at| Message {
            id: Uuid::now_v7(),
            sender_id: a,
            room_id: room_id.clone(),
            text: text.into(),
            sent_at,
            client_timestamp: None,
        };

        let mut store = ConversationStore::new();
        store.restore(
            ConversationRecord {
                room_id: room_id.clone(),
                participants: [a, b],
                messages: vec![msg("stale", T0), msg("live", T0 + 300_000)],
            },
            T0 + 650_000,
        );

        let conversation = store.get(&room_id).unwrap();
        assert_eq!(conversation.stored_len(), 1);
        assert_eq!(conversation.partner_of(b), Some(a));
    }
}
