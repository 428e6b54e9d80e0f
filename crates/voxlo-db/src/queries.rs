use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, warn};
use uuid::Uuid;

use voxlo_types::models::{Identity, IdentityId, Message, RoomId};
use voxlo_types::snapshot::{ConversationRecord, Snapshot};

use crate::Database;
use crate::models::{ConversationRow, IdentityRow, MessageRow};

impl Database {
    /// Replace the stored snapshot with `snapshot` in a single transaction.
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM messages", [])?;
            tx.execute("DELETE FROM conversations", [])?;
            tx.execute("DELETE FROM identities", [])?;

            {
                let mut insert_identity = tx.prepare(
                    "INSERT INTO identities (id, display_name, invite_code, created_at, deactivated)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for identity in &snapshot.identities {
                    insert_identity.execute(params![
                        identity.id.to_string(),
                        identity.display_name,
                        identity.invite_code,
                        identity.created_at.to_rfc3339(),
                        identity.deactivated,
                    ])?;
                }

                let mut insert_conversation = tx.prepare(
                    "INSERT INTO conversations (room_id, participant_a, participant_b) VALUES (?1, ?2, ?3)",
                )?;
                let mut insert_message = tx.prepare(
                    "INSERT INTO messages (id, room_id, sender_id, text, sent_at, client_timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for conversation in &snapshot.conversations {
                    let [a, b] = conversation.participants;
                    insert_conversation.execute(params![
                        conversation.room_id.as_str(),
                        a.to_string(),
                        b.to_string(),
                    ])?;
                    for message in &conversation.messages {
                        insert_message.execute(params![
                            message.id.to_string(),
                            conversation.room_id.as_str(),
                            message.sender_id.to_string(),
                            message.text,
                            message.sent_at,
                            message.client_timestamp,
                        ])?;
                    }
                }
            }

            tx.commit()?;
            debug!(
                "Snapshot saved: {} identities, {} conversations",
                snapshot.identities.len(),
                snapshot.conversations.len()
            );
            Ok(())
        })
    }

    /// Load the stored snapshot. Corrupt rows are skipped with a warning.
    pub fn load_snapshot(&self) -> Result<Snapshot> {
        let (identity_rows, conversation_rows, message_rows) = self.with_conn(|conn| {
            Ok((
                query_identities(conn)?,
                query_conversations(conn)?,
                query_messages(conn)?,
            ))
        })?;

        let identities = identity_rows.into_iter().filter_map(identity_from_row).collect();

        let mut messages_by_room: HashMap<String, Vec<Message>> = HashMap::new();
        for row in message_rows {
            let room = row.room_id.clone();
            if let Some(message) = message_from_row(row) {
                messages_by_room.entry(room).or_default().push(message);
            }
        }

        let conversations = conversation_rows
            .into_iter()
            .filter_map(|row| {
                let messages = messages_by_room.remove(&row.room_id).unwrap_or_default();
                conversation_from_row(row, messages)
            })
            .collect();

        Ok(Snapshot {
            identities,
            conversations,
        })
    }
}

fn query_identities(conn: &Connection) -> Result<Vec<IdentityRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, display_name, invite_code, created_at, deactivated FROM identities ORDER BY created_at",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(IdentityRow {
                id: row.get(0)?,
                display_name: row.get(1)?,
                invite_code: row.get(2)?,
                created_at: row.get(3)?,
                deactivated: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_conversations(conn: &Connection) -> Result<Vec<ConversationRow>> {
    let mut stmt = conn.prepare("SELECT room_id, participant_a, participant_b FROM conversations")?;

    let rows = stmt
        .query_map([], |row| {
            Ok(ConversationRow {
                room_id: row.get(0)?,
                participant_a: row.get(1)?,
                participant_b: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_messages(conn: &Connection) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, room_id, sender_id, text, sent_at, client_timestamp
         FROM messages
         ORDER BY room_id, sent_at, id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                room_id: row.get(1)?,
                sender_id: row.get(2)?,
                text: row.get(3)?,
                sent_at: row.get(4)?,
                client_timestamp: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn identity_from_row(row: IdentityRow) -> Option<Identity> {
    let id = match row.id.parse::<IdentityId>() {
        Ok(id) => id,
        Err(e) => {
            warn!("Corrupt identity id '{}': {}", row.id, e);
            return None;
        }
    };
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on identity '{}': {}", row.created_at, row.id, e);
            Utc::now()
        });

    Some(Identity {
        id,
        display_name: row.display_name,
        invite_code: row.invite_code,
        created_at,
        deactivated: row.deactivated,
    })
}

fn conversation_from_row(row: ConversationRow, messages: Vec<Message>) -> Option<ConversationRecord> {
    let a = row.participant_a.parse::<IdentityId>().ok();
    let b = row.participant_b.parse::<IdentityId>().ok();
    let (Some(a), Some(b)) = (a, b) else {
        warn!("Corrupt participants on conversation '{}'", row.room_id);
        return None;
    };

    Some(ConversationRecord {
        room_id: RoomId::from(row.room_id),
        participants: [a, b],
        messages,
    })
}

fn message_from_row(row: MessageRow) -> Option<Message> {
    let id = match row.id.parse::<Uuid>() {
        Ok(id) => id,
        Err(e) => {
            warn!("Corrupt message id '{}': {}", row.id, e);
            return None;
        }
    };
    let sender_id = match row.sender_id.parse::<IdentityId>() {
        Ok(id) => id,
        Err(e) => {
            warn!("Corrupt sender_id '{}' on message '{}': {}", row.sender_id, row.id, e);
            return None;
        }
    };

    Some(Message {
        id,
        sender_id,
        room_id: RoomId::from(row.room_id),
        text: row.text,
        sent_at: row.sent_at,
        client_timestamp: row.client_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, code: &str) -> Identity {
        Identity {
            id: IdentityId::new(),
            display_name: name.to_string(),
            invite_code: code.to_string(),
            created_at: Utc::now(),
            deactivated: false,
        }
    }

    fn message(room_id: &RoomId, sender_id: IdentityId, text: &str, sent_at: i64) -> Message {
        Message {
            id: Uuid::now_v7(),
            sender_id,
            room_id: room_id.clone(),
            text: text.to_string(),
            sent_at,
            client_timestamp: Some(sent_at - 3),
        }
    }

    #[test]
    fn snapshot_survives_reopen() {
        let db = Database::open_in_memory().unwrap();

        let ada = identity("ada", "Q7F2K9");
        let bob = identity("bob", "ZZ00AA");
        let room_id = RoomId::for_pair(ada.id, bob.id);
        let snapshot = Snapshot {
            identities: vec![ada.clone(), bob.clone()],
            conversations: vec![ConversationRecord {
                room_id: room_id.clone(),
                participants: [ada.id, bob.id],
                messages: vec![
                    message(&room_id, ada.id, "hi", 1_000),
                    message(&room_id, bob.id, "hey", 2_000),
                ],
            }],
        };

        db.save_snapshot(&snapshot).unwrap();
        let loaded = db.load_snapshot().unwrap();

        assert_eq!(loaded.identities.len(), 2);
        let loaded_ada = loaded.identities.iter().find(|i| i.id == ada.id).unwrap();
        assert_eq!(loaded_ada.invite_code, "Q7F2K9");
        assert_eq!(loaded.conversations.len(), 1);
        let texts: Vec<_> = loaded.conversations[0]
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["hi", "hey"]);
        assert_eq!(loaded.conversations[0].messages[0].client_timestamp, Some(997));
    }

    #[test]
    fn saving_replaces_previous_snapshot() {
        let db = Database::open_in_memory().unwrap();

        let ada = identity("ada", "AAAAAA");
        db.save_snapshot(&Snapshot {
            identities: vec![ada.clone(), identity("bob", "BBBBBB")],
            conversations: vec![],
        })
        .unwrap();
        db.save_snapshot(&Snapshot {
            identities: vec![ada],
            conversations: vec![],
        })
        .unwrap();

        let loaded = db.load_snapshot().unwrap();
        assert_eq!(loaded.identities.len(), 1);
        assert_eq!(loaded.identities[0].display_name, "ada");
    }
}
