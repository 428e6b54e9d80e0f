use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages vanish this many milliseconds after they were sent.
pub const MESSAGE_TTL_MS: i64 = 600_000;

pub const INVITE_CODE_LEN: usize = 6;
pub const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Stable id of a logical user. Survives reconnects and restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for IdentityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Room id of a two-party conversation.
///
/// Derived from the sorted pair of participant ids, so `for_pair(a, b)` and
/// `for_pair(b, a)` always name the same room, across process restarts too.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn for_pair(a: IdentityId, b: IdentityId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}:{hi}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trim and upper-case a user supplied invite code. Returns `None` when the
/// result is not a well-formed code.
pub fn normalize_invite_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    let well_formed = code.len() == INVITE_CODE_LEN
        && code.bytes().all(|b| INVITE_CODE_ALPHABET.contains(&b));
    well_formed.then_some(code)
}

/// A message is live while less than [`MESSAGE_TTL_MS`] has passed since it
/// was sent. Always computed against the caller's `now`, never stored.
pub fn is_live(sent_at: i64, now: i64) -> bool {
    now.saturating_sub(sent_at) < MESSAGE_TTL_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: String,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deactivated: bool,
}

/// A chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: IdentityId,
    pub room_id: RoomId,
    pub text: String,
    /// Server receive time, unix milliseconds.
    pub sent_at: i64,
    /// Echo of the sender's own timestamp so it can match its local copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<i64>,
}

impl Message {
    pub fn is_live(&self, now: i64) -> bool {
        is_live(self.sent_at, now)
    }
}

/// One party's view of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub room_id: RoomId,
    pub partner_id: IdentityId,
    pub partner_name: String,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_is_commutative() {
        let a = IdentityId::new();
        let b = IdentityId::new();
        assert_eq!(RoomId::for_pair(a, b), RoomId::for_pair(b, a));
        assert_ne!(RoomId::for_pair(a, b), RoomId::for_pair(a, IdentityId::new()));
    }

    #[test]
    fn liveness_boundary() {
        let now = 10_000_000;
        assert!(is_live(now - 599_999, now));
        assert!(!is_live(now - 600_000, now));
        assert!(!is_live(now - 600_001, now));
        assert!(is_live(now, now));
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        assert!(!is_live(i64::MIN, 10_000_000));
        assert!(is_live(i64::MAX, i64::MAX));
    }

    #[test]
    fn invite_code_normalization() {
        assert_eq!(normalize_invite_code(" q7f2k9 ").as_deref(), Some("Q7F2K9"));
        assert_eq!(normalize_invite_code("Q7F2K"), None);
        assert_eq!(normalize_invite_code("Q7F2K9X"), None);
        assert_eq!(normalize_invite_code("Q7-2K9"), None);
    }
}
