/// Reserved identity: as an owner, it stands for every principal;
/// in a persisted entry without principal, it names the group of everyone.
pub const ALL: &str = "all";

/// An already authenticated identity, a user or a group.
/// Principals are ordered byte-wise on their name, case-sensitive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn all() -> Self {
        Self(ALL.to_string())
    }

    pub fn name(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_all(&self) -> bool {
        self.0 == ALL
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Principal {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Context of the request currently processed
#[derive(Clone, Debug)]
pub struct Transaction {
    pub principal: Principal,
}

impl Transaction {
    pub fn new(principal: impl Into<Principal>) -> Self {
        Self {
            principal: principal.into(),
        }
    }
}
