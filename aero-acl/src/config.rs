use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AclConfig {
    /// Filesystem directory mapped to the DAV root `/`
    pub root: PathBuf,

    #[serde(default)]
    pub missing_owner: MissingOwner,

    /// URLs of the collections holding the principals, advertised as
    /// DAV:principal-collection-set
    #[serde(default)]
    pub principal_collection_set: Vec<String>,
}

impl AclConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            missing_owner: MissingOwner::default(),
            principal_collection_set: vec![],
        }
    }
}

/// What to do with a persisted record that has no owner
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MissingOwner {
    /// Loading fails with an integrity error
    #[default]
    Reject,
    /// Load it ownerless, the principal of the next write becomes the owner
    RepairOnWrite,
}
