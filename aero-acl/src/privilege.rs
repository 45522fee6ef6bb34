use std::collections::BTreeMap;

use im::OrdSet;
use lazy_static::lazy_static;

use crate::principal::Principal;

//RFC covered: RFC3744 (ACL core) + RFC4791 section 6.1.1 (read-free-busy)

/// The privilege vocabulary understood by the server.
/// Declaration order is the order used when privileges are listed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrivilegeName {
    All,
    Read,
    Write,
    WriteProperties,
    WriteContent,
    Unlock,
    ReadAcl,
    ReadCurrentUserPrivilegeSet,
    WriteAcl,
    Bind,
    Unbind,
    ReadFreeBusy,
}

pub const ALL_PRIVILEGES: [PrivilegeName; 12] = [
    PrivilegeName::All,
    PrivilegeName::Read,
    PrivilegeName::Write,
    PrivilegeName::WriteProperties,
    PrivilegeName::WriteContent,
    PrivilegeName::Unlock,
    PrivilegeName::ReadAcl,
    PrivilegeName::ReadCurrentUserPrivilegeSet,
    PrivilegeName::WriteAcl,
    PrivilegeName::Bind,
    PrivilegeName::Unbind,
    PrivilegeName::ReadFreeBusy,
];

impl PrivilegeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Read => "read",
            Self::Write => "write",
            Self::WriteProperties => "write-properties",
            Self::WriteContent => "write-content",
            Self::Unlock => "unlock",
            Self::ReadAcl => "read-acl",
            Self::ReadCurrentUserPrivilegeSet => "read-current-user-privilege-set",
            Self::WriteAcl => "write-acl",
            Self::Bind => "bind",
            Self::Unbind => "unbind",
            Self::ReadFreeBusy => "read-free-busy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::All => "Any operation",
            Self::Read => "Read any object",
            Self::Write => "Write any object",
            Self::WriteProperties => "Write properties",
            Self::WriteContent => "Write resource content",
            Self::Unlock => "Unlock resource",
            Self::ReadAcl => "Read ACL",
            Self::ReadCurrentUserPrivilegeSet => "Read current user privilege set property",
            Self::WriteAcl => "Write ACL",
            Self::Bind => "Add a member to a collection",
            Self::Unbind => "Remove a member from a collection",
            Self::ReadFreeBusy => "Read free/busy information",
        }
    }
}

impl std::fmt::Display for PrivilegeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported privilege {0:?}")]
pub struct UnknownPrivilege(pub String);

impl std::str::FromStr for PrivilegeName {
    type Err = UnknownPrivilege;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_PRIVILEGES
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownPrivilege(s.to_string()))
    }
}

lazy_static! {
    static ref SUPPORTED_PRIVILEGES: BTreeMap<&'static str, &'static str> = ALL_PRIVILEGES
        .iter()
        .map(|p| (p.as_str(), p.description()))
        .collect();
}

/// Privilege name to description, the DAV:supported-privilege-set
pub fn supported_privileges() -> &'static BTreeMap<&'static str, &'static str> {
    &SUPPORTED_PRIVILEGES
}

/// What one principal is granted and denied on a resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Privilege {
    principal: Principal,
    granted: OrdSet<PrivilegeName>,
    denied: OrdSet<PrivilegeName>,
}

impl Privilege {
    /// No grant, no denial
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            granted: OrdSet::new(),
            denied: OrdSet::new(),
        }
    }

    /// Every supported privilege is granted
    pub fn all_granted(principal: Principal) -> Self {
        Self {
            principal,
            granted: ALL_PRIVILEGES.iter().copied().collect(),
            denied: OrdSet::new(),
        }
    }

    /// Build an entry from raw sets, a name may be present in both of them.
    pub fn from_sets(
        principal: Principal,
        granted: impl IntoIterator<Item = PrivilegeName>,
        denied: impl IntoIterator<Item = PrivilegeName>,
    ) -> Self {
        Self {
            principal,
            granted: granted.into_iter().collect(),
            denied: denied.into_iter().collect(),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn grant(&mut self, name: PrivilegeName) -> &mut Self {
        self.denied.remove(&name);
        self.granted.insert(name);
        self
    }

    pub fn deny(&mut self, name: PrivilegeName) -> &mut Self {
        self.granted.remove(&name);
        self.denied.insert(name);
        self
    }

    /// Neither granted nor denied anymore
    pub fn revoke(&mut self, name: PrivilegeName) -> &mut Self {
        self.granted.remove(&name);
        self.denied.remove(&name);
        self
    }

    pub fn is_granted(&self, name: PrivilegeName) -> bool {
        self.granted.contains(&name)
    }

    pub fn is_denied(&self, name: PrivilegeName) -> bool {
        self.denied.contains(&name)
    }

    pub fn granted(&self) -> impl Iterator<Item = PrivilegeName> + '_ {
        self.granted.iter().copied()
    }

    pub fn denied(&self) -> impl Iterator<Item = PrivilegeName> + '_ {
        self.denied.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty() && self.denied.is_empty()
    }
}
