/*
 * A record file lives in each directory of the DAV tree and holds
 * the ACL records of every resource of this directory, one record per
 * resource path.
 *
 * Writers never rewrite a record file blindly: they describe the records
 * they want to replace or remove in a Batch, and the backend applies the
 * batch as a single read-modify-write under the file lock.
 */

pub mod fs;
pub mod in_memory;
pub mod record;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use record::{AclRecord, Grant, PrincipalEntry, RecordFile};

/// Name of the record file, shared by all the resources of a directory
pub const ACL_FILENAME: &str = ".acl";

/// True for the record file and for the temporary files written while
/// committing it, none of them is a DAV resource.
pub fn is_store_file(name: &str) -> bool {
    name == ACL_FILENAME
        || name
            .strip_prefix(ACL_FILENAME)
            .map_or(false, |rest| rest.starts_with('.') && rest.ends_with(".tmp"))
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("record file not found")]
    NotFound,
    #[error("record file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// The file can't be read as a record file
    #[error("record file is corrupted: {0}")]
    Corrupted(String),
    /// The file decodes but breaks the record contract
    #[error("record contract violated: {0}")]
    Integrity(String),
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Identifies the record file of a directory
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    dir: PathBuf,
}

impl Location {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    pub fn file(&self) -> PathBuf {
        self.dir.join(ACL_FILENAME)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file().display())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    /// Insert the record, or replace the one with the same path
    Update(AclRecord),
    /// Remove the record bound to this path, if any
    Remove(String),
}

#[async_trait]
pub trait IStore {
    async fn file_exists(&self, loc: &Location) -> Result<bool, StorageError>;
    async fn file_fetch(&self, loc: &Location) -> Result<RecordFile, StorageError>;

    /// Apply all the changes on the record file as a single atomic step,
    /// the file is created if it does not exist yet.
    /// Records that are not named by a change are kept untouched.
    async fn file_commit(&self, loc: &Location, changes: Vec<Change>) -> Result<(), StorageError>;
}

pub type Store = Box<dyn IStore + Send + Sync>;

/// Pending changes on one record file.
/// Nothing is written until `commit` is called, a dropped batch is discarded.
pub struct Batch<'a> {
    store: &'a (dyn IStore + Send + Sync),
    loc: Location,
    changes: Vec<Change>,
}

impl<'a> Batch<'a> {
    pub fn new(store: &'a (dyn IStore + Send + Sync), loc: Location) -> Self {
        Self {
            store,
            loc,
            changes: vec![],
        }
    }

    pub fn update(&mut self, record: AclRecord) -> &mut Self {
        self.changes.push(Change::Update(record));
        self
    }

    pub fn remove(&mut self, path: impl Into<String>) -> &mut Self {
        self.changes.push(Change::Remove(path.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub async fn commit(mut self) -> Result<(), StorageError> {
        let changes = std::mem::take(&mut self.changes);
        if changes.is_empty() {
            return Ok(());
        }
        tracing::trace!(file=%self.loc, changes=changes.len(), "commit record batch");
        self.store.file_commit(&self.loc, changes).await
    }
}

impl<'a> Drop for Batch<'a> {
    fn drop(&mut self) {
        if !self.changes.is_empty() {
            tracing::debug!(file=%self.loc, changes=self.changes.len(), "uncommitted record batch discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::MemStore;

    #[test]
    fn store_file_names() {
        assert!(is_store_file(".acl"));
        assert!(is_store_file(".acl.9f86d081884c7d65.tmp"));
        assert!(!is_store_file(".aclrc"));
        assert!(!is_store_file(".acl.tmp.ics"));
        assert!(!is_store_file("acl"));
    }

    #[tokio::test]
    async fn dropped_batch_writes_nothing() {
        let store = MemStore::default();
        let loc = Location::in_dir("/cal");
        {
            let mut batch = Batch::new(&store, loc.clone());
            batch.update(AclRecord::new("/cal/a.ics"));
            assert!(!batch.is_empty());
        }
        assert!(!store.file_exists(&loc).await.unwrap());
    }

    #[tokio::test]
    async fn batch_applies_in_order() {
        let store = MemStore::default();
        let loc = Location::in_dir("/cal");

        let mut batch = Batch::new(&store, loc.clone());
        batch
            .update(AclRecord::new("/cal/a.ics"))
            .update(AclRecord::new("/cal/b.ics"))
            .remove("/cal/a.ics");
        batch.commit().await.unwrap();

        let file = store.file_fetch(&loc).await.unwrap();
        assert_eq!(file.len(), 1);
        assert!(file.get("/cal/b.ics").is_some());
    }

    #[test]
    fn location_points_to_the_shared_file() {
        let loc = Location::in_dir("/srv/dav/alice/calendar");
        assert_eq!(loc.file(), PathBuf::from("/srv/dav/alice/calendar/.acl"));
    }
}
