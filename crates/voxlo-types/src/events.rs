use serde::{Deserialize, Serialize};

use crate::models::{ChatView, IdentityId, Message, RoomId};

/// Events sent over the WebSocket gateway, server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Registration acknowledged; the invite code is bound to the identity
    Registered {
        identity_id: IdentityId,
        display_name: String,
        invite_code: String,
    },

    /// Reconciliation snapshot of every conversation the identity is in
    ChatsLoaded {
        chats: Vec<ChatView>,
        /// Rooms the client reported that the server has no record of
        #[serde(default)]
        forgotten_room_ids: Vec<RoomId>,
    },

    /// A pairing succeeded. Each party gets its own view.
    ChatConnected {
        room_id: RoomId,
        partner_id: IdentityId,
        partner_name: String,
        messages: Vec<Message>,
    },

    /// A message was posted to a room
    NewMessage(Message),

    /// The partner started or stopped typing
    UserTyping {
        room_id: RoomId,
        user_id: IdentityId,
        is_typing: bool,
    },

    /// A command from this connection failed
    Error { code: String, message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    /// Announce (or re-announce after a reconnect) which identity this socket speaks for
    Register {
        #[serde(default)]
        identity_id: Option<IdentityId>,
        #[serde(alias = "username")]
        display_name: String,
        /// Previously issued code, restored if the server lost its records
        #[serde(default)]
        invite_code: Option<String>,
    },

    /// Request the reconciliation snapshot
    GetChats {
        identity_id: IdentityId,
        #[serde(default)]
        known_room_ids: Vec<RoomId>,
    },

    /// Pair with the owner of an invite code
    ConnectWithCode {
        invite_code: String,
        my_identity_id: IdentityId,
    },

    SendMessage {
        room_id: RoomId,
        #[serde(alias = "message")]
        text: String,
        #[serde(default, alias = "timestamp")]
        client_timestamp: Option<i64>,
    },

    Typing { room_id: RoomId, is_typing: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_camel_case_wire_names() {
        let raw = r#"{"type":"connectWithCode","data":{"inviteCode":"Q7F2K9","myIdentityId":"6f1c1f5e-8a53-4c55-9d8b-2a0c6f5b1e11"}}"#;
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        match cmd {
            ClientCommand::ConnectWithCode { invite_code, .. } => assert_eq!(invite_code, "Q7F2K9"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn register_accepts_legacy_username_field() {
        let raw = r#"{"type":"register","data":{"username":"ada"}}"#;
        let cmd: ClientCommand = serde_json::from_str(raw).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Register {
                identity_id: None,
                display_name: "ada".into(),
                invite_code: None,
            }
        );
    }

    #[test]
    fn typing_event_shape() {
        let user_id: IdentityId = "6f1c1f5e-8a53-4c55-9d8b-2a0c6f5b1e11".parse().unwrap();
        let event = ServerEvent::UserTyping {
            room_id: RoomId::from("a:b"),
            user_id,
            is_typing: true,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "userTyping");
        assert_eq!(value["data"]["isTyping"], true);
        assert_eq!(value["data"]["roomId"], "a:b");
    }
}
