use im::OrdMap;

use crate::error::AclError;
use crate::principal::Principal;
use crate::privilege::{Privilege, PrivilegeName, ALL_PRIVILEGES};

/// The ACL of one resource: an owner and the privileges of the other principals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrivilegeCollection {
    /// Only missing while an ownerless record waits to be repaired
    owner: Option<Principal>,

    /// Entries are never empty, see `set_privilege`
    entries: OrdMap<Principal, Privilege>,
}

impl PrivilegeCollection {
    pub fn new(owner: Principal) -> Self {
        Self {
            owner: Some(owner),
            entries: OrdMap::new(),
        }
    }

    pub fn owner(&self) -> Option<&Principal> {
        self.owner.as_ref()
    }

    pub fn set_owner(&mut self, owner: Principal) {
        self.owner = Some(owner);
    }

    /// Entries ordered by principal name
    pub fn entries(&self) -> impl Iterator<Item = &Privilege> {
        self.entries.values()
    }

    pub fn get(&self, principal: &Principal) -> Option<&Privilege> {
        self.entries.get(principal)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn acts_as_owner(&self, principal: &Principal) -> bool {
        match &self.owner {
            Some(owner) => owner.is_all() || owner == principal,
            None => false,
        }
    }

    /// Decide if `principal` holds `privilege` on this resource.
    /// Rules are evaluated in order, the first one that matches decides.
    pub fn authorize(&self, principal: &Principal, privilege: &str) -> Result<(), AclError> {
        let denied = || {
            tracing::trace!(principal=%principal, privilege=privilege, "access denied");
            Err(AclError::denied(privilege))
        };

        // 1. unknown privileges are never granted
        let name: PrivilegeName = match privilege.parse() {
            Ok(n) => n,
            Err(_) => return denied(),
        };

        // 2. a collection without owner grants nothing
        let owner = match &self.owner {
            Some(o) => o,
            None => return denied(),
        };

        // 3. & 4. the owner holds everything, `all` as owner makes everyone an owner
        if owner.is_all() || owner == principal {
            return Ok(());
        }

        // 5. principals without entry get nothing
        let entry = match self.entries.get(principal) {
            Some(e) => e,
            None => return denied(),
        };

        // 6. a denial wins over a grant
        if entry.is_denied(name) {
            return denied();
        }

        // 7. only explicit grants authorize
        if !entry.is_granted(name) {
            return denied();
        }

        Ok(())
    }

    /// What `principal` actually holds on this resource
    pub fn effective_privilege(&self, principal: &Principal) -> Privilege {
        if self.acts_as_owner(principal) {
            return Privilege::all_granted(principal.clone());
        }

        self.entries
            .get(principal)
            .cloned()
            .unwrap_or_else(|| Privilege::new(principal.clone()))
    }

    /// The privileges `principal` is authorized for, in registry order
    pub fn current_user_privilege_set(&self, principal: &Principal) -> Vec<PrivilegeName> {
        ALL_PRIVILEGES
            .iter()
            .copied()
            .filter(|p| self.authorize(principal, p.as_str()).is_ok())
            .collect()
    }

    /// Replace the entry of the principal.
    /// The caller must have checked `write-acl` beforehand.
    pub fn set_privilege(&mut self, privilege: Privilege) {
        if privilege.is_empty() {
            self.entries.remove(privilege.principal());
            return;
        }
        self.entries.insert(privilege.principal().clone(), privilege);
    }

    pub fn remove_principal_privilege(&mut self, principal: &Principal) {
        self.entries.remove(principal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_calendar() -> PrivilegeCollection {
        let mut col = PrivilegeCollection::new("alice".into());
        let mut bob = Privilege::new("bob".into());
        bob.grant(PrivilegeName::Read).deny(PrivilegeName::Write);
        col.set_privilege(bob);
        col
    }

    #[test]
    fn unknown_privilege_is_denied_for_everyone() {
        let col = alice_calendar();
        for who in ["alice", "bob", "carol", "all"] {
            for what in ["admin", "READ", "", "read "] {
                assert!(col.authorize(&who.into(), what).unwrap_err().is_access_denied());
            }
        }

        let wildcard = PrivilegeCollection::new(Principal::all());
        assert!(wildcard.authorize(&"bob".into(), "admin").is_err());
    }

    #[test]
    fn ownerless_grants_nothing() {
        let mut col = PrivilegeCollection::default();
        let mut bob = Privilege::new("bob".into());
        bob.grant(PrivilegeName::Read);
        col.set_privilege(bob);

        assert!(col.authorize(&"bob".into(), "read").is_err());
        assert!(col.current_user_privilege_set(&"bob".into()).is_empty());
    }

    #[test]
    fn wildcard_owner() {
        let col = PrivilegeCollection::new(Principal::all());
        for who in ["alice", "bob", "all"] {
            for p in ALL_PRIVILEGES {
                assert!(col.authorize(&who.into(), p.as_str()).is_ok());
            }
        }
        assert_eq!(
            col.effective_privilege(&"bob".into()),
            Privilege::all_granted("bob".into())
        );
    }

    #[test]
    fn owner_has_everything() {
        let col = alice_calendar();
        assert!(col.get(&"alice".into()).is_none());
        for p in ALL_PRIVILEGES {
            assert!(col.authorize(&"alice".into(), p.as_str()).is_ok());
        }
        assert_eq!(
            col.current_user_privilege_set(&"alice".into()),
            ALL_PRIVILEGES.to_vec()
        );
    }

    #[test]
    fn unlisted_is_denied() {
        let col = alice_calendar();
        for p in ALL_PRIVILEGES {
            assert!(col.authorize(&"carol".into(), p.as_str()).is_err());
        }
        assert!(col.effective_privilege(&"carol".into()).is_empty());
    }

    #[test]
    fn explicit_grants_only() {
        let col = alice_calendar();
        assert!(col.authorize(&"bob".into(), "read").is_ok());
        assert!(col.authorize(&"bob".into(), "write").is_err());
        assert!(col.authorize(&"bob".into(), "read-acl").is_err());
        // "all" is not expanded for entries
        assert!(col.authorize(&"bob".into(), "all").is_err());
        assert_eq!(
            col.current_user_privilege_set(&"bob".into()),
            vec![PrivilegeName::Read]
        );
    }

    #[test]
    fn deny_wins_over_grant() {
        let mut col = alice_calendar();
        col.set_privilege(Privilege::from_sets(
            "bob".into(),
            [PrivilegeName::Read, PrivilegeName::Bind],
            [PrivilegeName::Read],
        ));
        assert!(col.authorize(&"bob".into(), "read").is_err());
        assert!(col.authorize(&"bob".into(), "bind").is_ok());
    }

    #[test]
    fn empty_privilege_removes_entry() {
        let mut col = alice_calendar();
        col.set_privilege(Privilege::new("bob".into()));

        assert!(col.get(&"bob".into()).is_none());
        assert!(col.is_empty());
        assert!(col.authorize(&"bob".into(), "read").is_err());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut col = alice_calendar();
        col.remove_principal_privilege(&"bob".into());
        col.remove_principal_privilege(&"bob".into());
        col.remove_principal_privilege(&"nobody".into());
        assert!(col.is_empty());
    }

    #[test]
    fn effective_privilege_is_the_stored_entry() {
        let col = alice_calendar();
        let bob = col.effective_privilege(&"bob".into());
        assert_eq!(Some(&bob), col.get(&"bob".into()));
        assert!(bob.is_granted(PrivilegeName::Read));
        assert!(bob.is_denied(PrivilegeName::Write));
    }

    #[test]
    fn entries_are_ordered_by_name() {
        let mut col = PrivilegeCollection::new("alice".into());
        for who in ["mallory", "Bob", "carol"] {
            let mut p = Privilege::new(who.into());
            p.grant(PrivilegeName::Read);
            col.set_privilege(p);
        }
        let names: Vec<&str> = col.entries().map(|p| p.principal().name()).collect();
        assert_eq!(names, vec!["Bob", "carol", "mallory"]);
    }
}
