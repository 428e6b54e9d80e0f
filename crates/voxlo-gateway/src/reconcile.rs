//! Reconciliation: bringing a (re)connecting socket up to date.
//!
//! The server's view is authoritative for which conversations exist and
//! which messages are still live. Clients merge the snapshot into their
//! local state by message id, and drop any room listed as forgotten.

use std::collections::HashSet;

use tracing::{debug, info};

use voxlo_types::events::ServerEvent;
use voxlo_types::models::{ChatView, Identity, IdentityId, RoomId};

use crate::error::GatewayError;
use crate::hub::HubState;
use crate::registry::ConnId;

impl HubState {
    pub(crate) fn register(
        &mut self,
        conn: ConnId,
        identity_id: Option<IdentityId>,
        display_name: &str,
        invite_code: Option<&str>,
    ) -> Result<Identity, GatewayError> {
        let identity = match identity_id {
            Some(id) if self.directory.get(id).is_some() => {
                self.directory.set_display_name(id, display_name)?;
                let known = self
                    .directory
                    .reissue_or_keep(id)
                    .cloned()
                    .ok_or(GatewayError::UnregisteredSender)?;
                info!("{} ({}) re-registered, keeping code {}", known.display_name, id, known.invite_code);
                known
            }
            Some(id) => {
                let restored = self.directory.restore(id, display_name, invite_code)?;
                info!("Restored unknown identity {} with code {}", id, restored.invite_code);
                restored
            }
            None => {
                let created = self.directory.register(display_name)?;
                info!(
                    "User registered: {} ({}) with code {}",
                    created.display_name, created.id, created.invite_code
                );
                created
            }
        };

        self.rejoin(conn, identity.id);

        self.registry.deliver(
            conn,
            ServerEvent::Registered {
                identity_id: identity.id,
                display_name: identity.display_name.clone(),
                invite_code: identity.invite_code.clone(),
            },
        );
        Ok(identity)
    }

    /// Bind the socket and join it to every room the identity is in.
    pub(crate) fn rejoin(&mut self, conn: ConnId, identity: IdentityId) -> usize {
        if let Some(previous) = self.registry.bind(conn, identity) {
            if previous.now_absent {
                self.directory.mark_absent(previous.identity);
            }
        }
        self.directory.reissue_or_keep(identity);

        let rooms: Vec<RoomId> = self
            .conversations
            .rooms_of(identity)
            .map(|c| c.room_id.clone())
            .collect();
        let joined = rooms
            .iter()
            .filter(|room_id| self.registry.join(room_id, conn))
            .count();
        debug!("Connection {} joined {} rooms for {}", conn, joined, identity);
        joined
    }

    /// Build `chatsLoaded` for the identity and deliver it to `conn`.
    pub(crate) fn reconcile(
        &mut self,
        conn: ConnId,
        identity: IdentityId,
        known_room_ids: &[RoomId],
        now: i64,
    ) -> Result<Vec<ChatView>, GatewayError> {
        self.rejoin(conn, identity);

        let chats = self.chats_for(identity, now);

        let present: HashSet<&RoomId> = chats.iter().map(|c| &c.room_id).collect();
        let forgotten_room_ids: Vec<RoomId> = known_room_ids
            .iter()
            .filter(|room_id| !present.contains(room_id))
            .cloned()
            .collect();
        if !forgotten_room_ids.is_empty() {
            info!(
                "{} has {} rooms the server no longer knows",
                identity,
                forgotten_room_ids.len()
            );
        }

        self.registry.deliver(
            conn,
            ServerEvent::ChatsLoaded {
                chats: chats.clone(),
                forgotten_room_ids,
            },
        );
        Ok(chats)
    }

    /// One view per conversation the identity takes part in, filtered to
    /// live messages at `now`.
    pub(crate) fn chats_for(&self, identity: IdentityId, now: i64) -> Vec<ChatView> {
        self.conversations
            .rooms_of(identity)
            .filter_map(|conversation| {
                let partner_id = conversation.partner_of(identity)?;
                Some(ChatView {
                    room_id: conversation.room_id.clone(),
                    partner_id,
                    partner_name: self.display_name_of(partner_id),
                    messages: conversation.live_messages(now),
                })
            })
            .collect()
    }
}
