use tracing::info;

use voxlo_types::events::ServerEvent;
use voxlo_types::models::{IdentityId, RoomId};

use crate::error::GatewayError;
use crate::hub::HubState;

impl HubState {
    /// Pair `requester` with the owner of `invite_code`.
    ///
    /// Idempotent: pairing the same two identities again (either way round)
    /// reuses the conversation, and still joins handles that came online
    /// since the last pairing.
    pub(crate) fn pair(
        &mut self,
        requester: IdentityId,
        invite_code: &str,
        now: i64,
    ) -> Result<RoomId, GatewayError> {
        let target = self
            .directory
            .resolve_invite(invite_code)
            .cloned()
            .ok_or(GatewayError::InvalidCode)?;
        if target.id == requester {
            return Err(GatewayError::SelfPair);
        }

        let requester = self
            .directory
            .get(requester)
            .cloned()
            .ok_or(GatewayError::UnregisteredSender)?;
        if requester.deactivated || target.deactivated {
            return Err(GatewayError::PartyUnavailable);
        }

        let (conversation, created) = self.conversations.get_or_create(requester.id, target.id);
        let room_id = conversation.room_id.clone();
        let messages = conversation.live_messages(now);

        for party in [requester.id, target.id] {
            for conn in self.registry.live_handles_of(party) {
                self.registry.join(&room_id, conn);
            }
        }

        for (party, partner) in [(&requester, &target), (&target, &requester)] {
            let event = ServerEvent::ChatConnected {
                room_id: room_id.clone(),
                partner_id: partner.id,
                partner_name: partner.display_name.clone(),
                messages: messages.clone(),
            };
            self.deliver_to_identity(party.id, &event);
        }

        info!(
            "Chat connected: {} <-> {} in {}{}",
            requester.display_name,
            target.display_name,
            room_id,
            if created { "" } else { " (existing)" }
        );
        Ok(room_id)
    }
}
