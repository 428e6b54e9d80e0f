use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use voxlo_types::events::{ClientCommand, ServerEvent};
use voxlo_types::models::{ChatView, Identity, IdentityId, Message, RoomId};
use voxlo_types::snapshot::Snapshot;

use crate::clock::{Clock, SystemClock};
use crate::conversations::ConversationStore;
use crate::directory::Directory;
use crate::error::GatewayError;
use crate::registry::{ConnId, ConnectionSender, Registry};

/// Process-wide coordinator state. Every inbound event runs against it as
/// one critical section.
#[derive(Debug, Default)]
pub struct HubState {
    pub(crate) directory: Directory,
    pub(crate) registry: Registry,
    pub(crate) conversations: ConversationStore,
}

impl HubState {
    /// Identity the socket is bound to.
    pub(crate) fn sender_of(&self, conn: ConnId) -> Result<IdentityId, GatewayError> {
        self.registry
            .identity_of(conn)
            .ok_or(GatewayError::UnregisteredSender)
    }

    /// Identity the socket is bound to, which must be the one it claims.
    pub(crate) fn authorize(&self, conn: ConnId, claimed: IdentityId) -> Result<IdentityId, GatewayError> {
        let bound = self.sender_of(conn)?;
        if bound != claimed {
            return Err(GatewayError::UnregisteredSender);
        }
        Ok(bound)
    }

    pub(crate) fn display_name_of(&self, id: IdentityId) -> String {
        self.directory
            .get(id)
            .map(|i| i.display_name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Deliver to every live handle of one identity.
    pub(crate) fn deliver_to_identity(&self, id: IdentityId, event: &ServerEvent) {
        for conn in self.registry.live_handles_of(id) {
            self.registry.deliver(conn, event.clone());
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            identities: self.directory.iter().cloned().collect(),
            conversations: self.conversations.iter().map(|c| c.to_record()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub identities: usize,
    pub online: usize,
    pub connections: usize,
    pub conversations: usize,
}

/// Shared handle to the coordinator.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    state: Mutex<HubState>,
    clock: Arc<dyn Clock>,
    /// Signalled whenever state worth persisting changed
    changed: Notify,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::from_state(HubState::default(), clock)
    }

    /// Rebuild from a persisted snapshot. Every identity starts absent and
    /// every loaded message is re-checked against the TTL.
    pub fn restore(snapshot: Snapshot, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        let mut state = HubState::default();

        for identity in snapshot.identities {
            state.directory.insert_loaded(identity);
        }
        for record in snapshot.conversations {
            state.conversations.restore(record, now);
        }

        info!(
            "Restored {} identities and {} conversations",
            state.directory.len(),
            state.conversations.len()
        );
        Self::from_state(state, clock)
    }

    fn from_state(state: HubState, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(state),
                clock,
                changed: Notify::new(),
            }),
        }
    }

    pub fn now(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    /// Register a socket's outbound queue. The socket speaks for nobody
    /// until it sends `register`.
    pub async fn attach(&self, conn: ConnId, sender: ConnectionSender) {
        self.inner.state.lock().await.registry.attach(conn, sender);
    }

    /// Run one client command. Failures are reported to the originating
    /// socket as an `error` event.
    pub async fn dispatch(&self, conn: ConnId, cmd: ClientCommand) {
        let result = match cmd {
            ClientCommand::Register {
                identity_id,
                display_name,
                invite_code,
            } => self
                .register(conn, identity_id, &display_name, invite_code.as_deref())
                .await
                .map(drop),
            ClientCommand::GetChats {
                identity_id,
                known_room_ids,
            } => self.get_chats(conn, identity_id, &known_room_ids).await.map(drop),
            ClientCommand::ConnectWithCode {
                invite_code,
                my_identity_id,
            } => self.pair(conn, my_identity_id, &invite_code).await.map(drop),
            ClientCommand::SendMessage {
                room_id,
                text,
                client_timestamp,
            } => self.send(conn, &room_id, text, client_timestamp).await.map(drop),
            ClientCommand::Typing { room_id, is_typing } => {
                self.typing(conn, &room_id, is_typing).await
            }
        };

        if let Err(err) = result {
            warn!("Connection {} command failed: {}", conn, err);
            self.report(conn, &err).await;
        }
    }

    /// Send an `error` event to one socket.
    pub async fn report(&self, conn: ConnId, err: &GatewayError) {
        let event = ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        };
        self.inner.state.lock().await.registry.deliver(conn, event);
    }

    /// `register`: bind the socket to a new, known or restored identity and
    /// rejoin its rooms. Acknowledged with `registered`.
    pub async fn register(
        &self,
        conn: ConnId,
        identity_id: Option<IdentityId>,
        display_name: &str,
        invite_code: Option<&str>,
    ) -> Result<Identity, GatewayError> {
        let identity = {
            let mut state = self.inner.state.lock().await;
            state.register(conn, identity_id, display_name, invite_code)?
        };
        self.mark_changed();
        Ok(identity)
    }

    /// `getChats`: reconciliation snapshot, answered with `chatsLoaded`.
    pub async fn get_chats(
        &self,
        conn: ConnId,
        identity_id: IdentityId,
        known_room_ids: &[RoomId],
    ) -> Result<Vec<ChatView>, GatewayError> {
        let mut state = self.inner.state.lock().await;
        let now = self.now();
        let identity = state.authorize(conn, identity_id)?;
        state.reconcile(conn, identity, known_room_ids, now)
    }

    /// `connectWithCode`: pair the socket's identity with the code's owner.
    pub async fn pair(
        &self,
        conn: ConnId,
        my_identity_id: IdentityId,
        invite_code: &str,
    ) -> Result<RoomId, GatewayError> {
        let room_id = {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            let requester = state.authorize(conn, my_identity_id)?;
            state.pair(requester, invite_code, now)?
        };
        self.mark_changed();
        Ok(room_id)
    }

    /// `sendMessage`: append and fan out to the room.
    pub async fn send(
        &self,
        conn: ConnId,
        room_id: &RoomId,
        text: String,
        client_timestamp: Option<i64>,
    ) -> Result<Message, GatewayError> {
        let message = {
            let mut state = self.inner.state.lock().await;
            // Read under the lock so `sent_at` follows processing order.
            let now = self.now();
            state.send(conn, room_id, text, client_timestamp, now)?
        };
        self.mark_changed();
        Ok(message)
    }

    /// `typing`: fan out to the partner's handles only. Not persisted.
    pub async fn typing(&self, conn: ConnId, room_id: &RoomId, is_typing: bool) -> Result<(), GatewayError> {
        self.inner.state.lock().await.typing(conn, room_id, is_typing)
    }

    /// Socket closed. Conversations and messages stay; the identity's code
    /// goes dormant once its last handle is gone.
    pub async fn disconnect(&self, conn: ConnId) {
        let mut state = self.inner.state.lock().await;
        if let Some(unbound) = state.registry.detach(conn) {
            if unbound.now_absent {
                state.directory.mark_absent(unbound.identity);
                info!("Identity {} is now absent", unbound.identity);
            }
        }
    }

    /// Live messages of a room at the current time.
    pub async fn live_messages(&self, room_id: &RoomId) -> Result<Vec<Message>, GatewayError> {
        let state = self.inner.state.lock().await;
        state.conversations.live_messages(room_id, self.now())
    }

    /// Drop expired messages everywhere. Returns how many were dropped.
    pub async fn compact_all(&self) -> usize {
        let removed = {
            let mut state = self.inner.state.lock().await;
            let now = self.now();
            state.conversations.compact_all(now)
        };
        if removed > 0 {
            self.mark_changed();
        }
        removed
    }

    /// Administratively deactivate an identity; it can no longer pair.
    pub async fn deactivate(&self, id: IdentityId) -> bool {
        let found = self.inner.state.lock().await.directory.deactivate(id);
        if found {
            info!("Identity {} deactivated", id);
            self.mark_changed();
        }
        found
    }

    /// Lift a deactivation; the identity can pair again.
    pub async fn reactivate(&self, id: IdentityId) -> bool {
        let found = self.inner.state.lock().await.directory.reactivate(id);
        if found {
            info!("Identity {} reactivated", id);
            self.mark_changed();
        }
        found
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub async fn stats(&self) -> HubStats {
        let state = self.inner.state.lock().await;
        HubStats {
            identities: state.directory.len(),
            online: state.registry.online_count(),
            connections: state.registry.connection_count(),
            conversations: state.conversations.len(),
        }
    }

    /// Resolves after the next change worth persisting.
    pub async fn changed(&self) {
        self.inner.changed.notified().await;
    }

    fn mark_changed(&self) {
        self.inner.changed.notify_one();
    }
}
