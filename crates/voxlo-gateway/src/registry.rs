use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use voxlo_types::events::ServerEvent;
use voxlo_types::models::{IdentityId, RoomId};

/// Outbound queue of one socket.
pub type ConnectionSender = mpsc::UnboundedSender<ServerEvent>;

/// Opaque per-socket handle. Never the same thing as an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of removing a handle from its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unbound {
    pub identity: IdentityId,
    /// The identity has no live handle left.
    pub now_absent: bool,
}

/// Live sockets, which identity each one speaks for, and which room
/// broadcast groups each one is in.
#[derive(Debug, Default)]
pub struct Registry {
    senders: HashMap<ConnId, ConnectionSender>,
    owners: HashMap<ConnId, IdentityId>,
    /// identity -> every live handle (one per tab/device)
    handles: HashMap<IdentityId, HashSet<ConnId>>,
    groups: HashMap<RoomId, HashSet<ConnId>>,
    memberships: HashMap<ConnId, HashSet<RoomId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, conn: ConnId, sender: ConnectionSender) {
        self.senders.insert(conn, sender);
    }

    /// Forget the socket entirely.
    pub fn detach(&mut self, conn: ConnId) -> Option<Unbound> {
        self.senders.remove(&conn);
        self.unbind(conn)
    }

    /// Bind a handle to an identity. Idempotent. Rebinding a handle to a
    /// different identity unbinds it from the previous one, which is
    /// reported back.
    pub fn bind(&mut self, conn: ConnId, identity: IdentityId) -> Option<Unbound> {
        let previous = match self.owners.get(&conn).copied() {
            Some(owner) if owner == identity => return None,
            Some(_) => self.unbind(conn),
            None => None,
        };

        self.owners.insert(conn, identity);
        self.handles.entry(identity).or_default().insert(conn);
        previous
    }

    /// Remove a handle from its identity's set and from every group.
    pub fn unbind(&mut self, conn: ConnId) -> Option<Unbound> {
        self.leave_all(conn);

        let identity = self.owners.remove(&conn)?;
        let now_absent = match self.handles.get_mut(&identity) {
            Some(set) => {
                set.remove(&conn);
                set.is_empty()
            }
            None => true,
        };
        if now_absent {
            self.handles.remove(&identity);
        }

        Some(Unbound {
            identity,
            now_absent,
        })
    }

    pub fn identity_of(&self, conn: ConnId) -> Option<IdentityId> {
        self.owners.get(&conn).copied()
    }

    pub fn live_handles_of(&self, identity: IdentityId) -> Vec<ConnId> {
        self.handles
            .get(&identity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Add a handle to a room's broadcast group. Returns false if it was
    /// already a member.
    pub fn join(&mut self, room: &RoomId, conn: ConnId) -> bool {
        let added = self.groups.entry(room.clone()).or_default().insert(conn);
        if added {
            self.memberships.entry(conn).or_default().insert(room.clone());
        }
        added
    }

    pub fn group(&self, room: &RoomId) -> Vec<ConnId> {
        self.groups
            .get(room)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Best-effort delivery. Events for sockets that are gone are dropped.
    pub fn deliver(&self, conn: ConnId, event: ServerEvent) -> bool {
        match self.senders.get(&conn) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Number of identities with at least one live handle.
    pub fn online_count(&self) -> usize {
        self.handles.len()
    }

    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    fn leave_all(&mut self, conn: ConnId) {
        let Some(rooms) = self.memberships.remove(&conn) else {
            return;
        };
        for room in rooms {
            if let Some(members) = self.groups.get_mut(&room) {
                members.remove(&conn);
                if members.is_empty() {
                    self.groups.remove(&room);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_owns_a_set_of_handles() {
        let mut reg = Registry::new();
        let ada = IdentityId::new();
        let tab1 = ConnId::new();
        let tab2 = ConnId::new();

        assert_eq!(reg.bind(tab1, ada), None);
        assert_eq!(reg.bind(tab1, ada), None);
        reg.bind(tab2, ada);

        let mut handles = reg.live_handles_of(ada);
        handles.sort_by_key(|c| c.to_string());
        let mut expected = vec![tab1, tab2];
        expected.sort_by_key(|c| c.to_string());
        assert_eq!(handles, expected);
        assert_eq!(reg.identity_of(tab2), Some(ada));

        let first = reg.unbind(tab1).unwrap();
        assert!(!first.now_absent);
        let last = reg.unbind(tab2).unwrap();
        assert!(last.now_absent);
        assert!(reg.live_handles_of(ada).is_empty());
        assert_eq!(reg.unbind(tab2), None);
    }

    #[test]
    fn rebinding_moves_the_handle() {
        let mut reg = Registry::new();
        let ada = IdentityId::new();
        let bob = IdentityId::new();
        let tab = ConnId::new();

        reg.bind(tab, ada);
        let moved = reg.bind(tab, bob).unwrap();
        assert_eq!(moved.identity, ada);
        assert!(moved.now_absent);
        assert_eq!(reg.identity_of(tab), Some(bob));
        assert!(reg.live_handles_of(ada).is_empty());
    }

    #[test]
    fn unbind_leaves_every_group() {
        let mut reg = Registry::new();
        let ada = IdentityId::new();
        let tab = ConnId::new();
        let room = RoomId::from("r1");

        reg.bind(tab, ada);
        assert!(reg.join(&room, tab));
        assert!(!reg.join(&room, tab));
        assert_eq!(reg.group(&room), vec![tab]);

        reg.unbind(tab);
        assert!(reg.group(&room).is_empty());
    }

    #[test]
    fn delivery_to_missing_socket_is_dropped() {
        let mut reg = Registry::new();
        let tab = ConnId::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        reg.attach(tab, tx);

        let event = ServerEvent::Error {
            code: "X".into(),
            message: "x".into(),
        };
        assert!(reg.deliver(tab, event.clone()));
        assert_eq!(rx.try_recv().unwrap(), event);

        reg.detach(tab);
        assert!(!reg.deliver(tab, event));
    }
}
