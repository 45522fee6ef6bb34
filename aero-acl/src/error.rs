use aero_store::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum AclError {
    /// Only the privilege is reported, never what other principals hold
    #[error("access denied: {privilege}")]
    AccessDenied { privilege: String },

    /// The resource path can't be mapped to a record file
    #[error("unable to set up resource ACL: {0}")]
    Setup(String),

    #[error("ACL storage failed: {0}")]
    Store(#[source] StorageError),

    /// Persisted data breaks the record contract, retrying won't help
    #[error("ACL integrity violation: {0}")]
    Integrity(String),
}

impl AclError {
    pub fn denied(privilege: impl Into<String>) -> Self {
        Self::AccessDenied {
            privilege: privilege.into(),
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<StorageError> for AclError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Integrity(msg) => Self::Integrity(msg),
            e => Self::Store(e),
        }
    }
}
