use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rand::Rng;
use tracing::warn;

use voxlo_types::models::{
    INVITE_CODE_ALPHABET, INVITE_CODE_LEN, Identity, IdentityId, normalize_invite_code,
};

use crate::error::GatewayError;

const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Identity records and the invite codes bound to them.
///
/// A code is reserved by its identity for good. It only resolves while the
/// identity is present (has a live connection); when the identity goes
/// absent the code goes dormant, and a reconnect wakes the same code up.
#[derive(Debug, Default)]
pub struct Directory {
    identities: HashMap<IdentityId, Identity>,
    /// Every reserved code, dormant or not.
    codes: HashMap<String, IdentityId>,
    /// Identities whose code currently resolves.
    present: HashSet<IdentityId>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new identity with a fresh invite code.
    pub fn register(&mut self, display_name: &str) -> Result<Identity, GatewayError> {
        let display_name = validate_display_name(display_name)?;
        let code = self.allocate_code(random_code);
        Ok(self.insert(IdentityId::new(), display_name, code))
    }

    /// Recreate an identity under a client-supplied id the server has no
    /// record of. The client's previous code is kept when it is still free.
    pub fn restore(
        &mut self,
        id: IdentityId,
        display_name: &str,
        preferred_code: Option<&str>,
    ) -> Result<Identity, GatewayError> {
        if let Some(existing) = self.identities.get(&id) {
            return Ok(existing.clone());
        }

        let display_name = validate_display_name(display_name)?;
        let code = preferred_code
            .and_then(normalize_invite_code)
            .filter(|code| !self.codes.contains_key(code))
            .unwrap_or_else(|| self.allocate_code(random_code));

        Ok(self.insert(id, display_name, code))
    }

    /// Bring a known identity back online. Its code is reused, never
    /// regenerated, so invites the partner already holds stay valid.
    pub fn reissue_or_keep(&mut self, id: IdentityId) -> Option<&Identity> {
        let identity = self.identities.get(&id)?;
        self.present.insert(id);
        Some(identity)
    }

    pub fn set_display_name(&mut self, id: IdentityId, display_name: &str) -> Result<(), GatewayError> {
        let display_name = validate_display_name(display_name)?;
        if let Some(identity) = self.identities.get_mut(&id) {
            identity.display_name = display_name;
        }
        Ok(())
    }

    /// Revoke the code's resolvability. The reservation is kept.
    pub fn mark_absent(&mut self, id: IdentityId) {
        self.present.remove(&id);
    }

    pub fn deactivate(&mut self, id: IdentityId) -> bool {
        match self.identities.get_mut(&id) {
            Some(identity) => {
                identity.deactivated = true;
                true
            }
            None => false,
        }
    }

    /// Undo [`Directory::deactivate`].
    pub fn reactivate(&mut self, id: IdentityId) -> bool {
        match self.identities.get_mut(&id) {
            Some(identity) => {
                identity.deactivated = false;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: IdentityId) -> Option<&Identity> {
        self.identities.get(&id)
    }

    /// Resolve an invite code to its owner. Only codes of present
    /// identities resolve.
    pub fn resolve_invite(&self, code: &str) -> Option<&Identity> {
        let code = normalize_invite_code(code)?;
        let id = self.codes.get(&code)?;
        if !self.present.contains(id) {
            return None;
        }
        self.identities.get(id)
    }

    /// Load a persisted identity. Loaded identities start absent.
    pub fn insert_loaded(&mut self, mut identity: Identity) {
        let usable = normalize_invite_code(&identity.invite_code).filter(|code| {
            self.codes
                .get(code)
                .is_none_or(|owner| *owner == identity.id)
        });
        identity.invite_code = match usable {
            Some(code) => code,
            None => {
                let fresh = self.allocate_code(random_code);
                warn!(
                    "Identity {} had unusable invite code '{}', reissued as {}",
                    identity.id, identity.invite_code, fresh
                );
                fresh
            }
        };
        self.codes.insert(identity.invite_code.clone(), identity.id);
        self.identities.insert(identity.id, identity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    fn insert(&mut self, id: IdentityId, display_name: String, invite_code: String) -> Identity {
        let identity = Identity {
            id,
            display_name,
            invite_code: invite_code.clone(),
            created_at: Utc::now(),
            deactivated: false,
        };
        self.codes.insert(invite_code, id);
        self.present.insert(id);
        self.identities.insert(id, identity.clone());
        identity
    }

    /// Draw codes until one is not reserved by anybody.
    fn allocate_code(&self, mut generate: impl FnMut() -> String) -> String {
        loop {
            let code = generate();
            if !self.codes.contains_key(&code) {
                return code;
            }
        }
    }
}

pub fn validate_display_name(raw: &str) -> Result<String, GatewayError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GatewayError::InvalidInput("display name is empty".into()));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(GatewayError::InvalidInput(format!(
            "display name is longer than {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn random_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_CODE_ALPHABET[rng.random_range(0..INVITE_CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_issues_resolvable_code() {
        let mut dir = Directory::new();
        let ada = dir.register("  Ada ").unwrap();

        assert_eq!(ada.display_name, "Ada");
        assert!(normalize_invite_code(&ada.invite_code).is_some());
        assert_eq!(dir.resolve_invite(&ada.invite_code).unwrap().id, ada.id);
        assert_eq!(
            dir.resolve_invite(&ada.invite_code.to_lowercase()).unwrap().id,
            ada.id
        );
    }

    #[test]
    fn register_rejects_empty_name() {
        let mut dir = Directory::new();
        assert!(matches!(dir.register("   "), Err(GatewayError::InvalidInput(_))));
    }

    #[test]
    fn collisions_are_regenerated() {
        let mut dir = Directory::new();
        let ada = dir.restore(IdentityId::new(), "ada", Some("AAAAAA")).unwrap();
        assert_eq!(ada.invite_code, "AAAAAA");

        let mut draws = vec!["BBBBBB", "AAAAAA", "AAAAAA"];
        let code = dir.allocate_code(|| draws.pop().unwrap().to_string());
        assert_eq!(code, "BBBBBB");
    }

    #[test]
    fn reconnect_keeps_the_same_code() {
        let mut dir = Directory::new();
        let ada = dir.register("ada").unwrap();

        dir.mark_absent(ada.id);
        assert!(dir.resolve_invite(&ada.invite_code).is_none());

        let again = dir.reissue_or_keep(ada.id).unwrap();
        assert_eq!(again.invite_code, ada.invite_code);
        assert_eq!(dir.resolve_invite(&ada.invite_code).unwrap().id, ada.id);
    }

    #[test]
    fn dormant_codes_stay_reserved() {
        let mut dir = Directory::new();
        let ada = dir.restore(IdentityId::new(), "ada", Some("Q7F2K9")).unwrap();
        dir.mark_absent(ada.id);

        let bob = dir.restore(IdentityId::new(), "bob", Some("Q7F2K9")).unwrap();
        assert_ne!(bob.invite_code, "Q7F2K9");
    }

    #[test]
    fn restore_keeps_known_identity() {
        let mut dir = Directory::new();
        let ada = dir.register("ada").unwrap();
        let again = dir.restore(ada.id, "someone else", Some("ZZZZZZ")).unwrap();
        assert_eq!(again, ada);
    }

    #[test]
    fn loaded_identities_start_absent() {
        let mut dir = Directory::new();
        let ada = Identity {
            id: IdentityId::new(),
            display_name: "ada".into(),
            invite_code: "Q7F2K9".into(),
            created_at: Utc::now(),
            deactivated: false,
        };
        dir.insert_loaded(ada.clone());

        assert!(dir.resolve_invite("Q7F2K9").is_none());
        dir.reissue_or_keep(ada.id);
        assert_eq!(dir.resolve_invite("Q7F2K9").unwrap().id, ada.id);
    }

    #[test]
    fn loaded_lowercase_code_is_normalized() {
        let mut dir = Directory::new();
        let ada = Identity {
            id: IdentityId::new(),
            display_name: "ada".into(),
            invite_code: "q7f2k9".into(),
            created_at: Utc::now(),
            deactivated: false,
        };
        dir.insert_loaded(ada.clone());
        let stored = dir.reissue_or_keep(ada.id).unwrap().invite_code.clone();

        assert_eq!(stored, "Q7F2K9");
        assert_eq!(dir.resolve_invite(&stored).unwrap().id, ada.id);
        assert_eq!(dir.resolve_invite("q7f2k9").unwrap().id, ada.id);
    }

    #[test]
    fn loaded_code_clash_after_normalizing_is_reissued() {
        let mut dir = Directory::new();
        let ada = dir.restore(IdentityId::new(), "ada", Some("Q7F2K9")).unwrap();
        let bob = Identity {
            id: IdentityId::new(),
            display_name: "bob".into(),
            invite_code: "q7f2k9".into(),
            created_at: Utc::now(),
            deactivated: false,
        };
        dir.insert_loaded(bob.clone());

        let stored = dir.get(bob.id).unwrap().invite_code.clone();
        assert_ne!(stored, "Q7F2K9");
        assert_eq!(dir.resolve_invite("Q7F2K9").unwrap().id, ada.id);
    }

    #[test]
    fn reactivate_clears_the_flag() {
        let mut dir = Directory::new();
        let ada = dir.register("ada").unwrap();

        assert!(dir.deactivate(ada.id));
        assert!(dir.get(ada.id).unwrap().deactivated);
        assert!(dir.reactivate(ada.id));
        assert!(!dir.get(ada.id).unwrap().deactivated);
        assert!(!dir.reactivate(IdentityId::new()));
    }
}
