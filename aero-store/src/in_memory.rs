use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::*;

/// Record files kept in memory, in their encoded form.
/// Clones share the same files, like several handles on the same tree.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemStore {
    fn files(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raw content of a record file
    pub fn raw(&self, loc: &Location) -> Option<Vec<u8>> {
        self.files().get(&loc.file()).cloned()
    }

    /// Overwrite a record file without decoding it
    pub fn put_raw(&self, loc: &Location, content: Vec<u8>) {
        self.files().insert(loc.file(), content);
    }
}

#[async_trait]
impl IStore for MemStore {
    async fn file_exists(&self, loc: &Location) -> Result<bool, StorageError> {
        Ok(self.files().contains_key(&loc.file()))
    }

    async fn file_fetch(&self, loc: &Location) -> Result<RecordFile, StorageError> {
        tracing::trace!(file=%loc, command="file_fetch");
        match self.files().get(&loc.file()) {
            Some(buf) => RecordFile::decode(buf),
            None => Err(StorageError::NotFound),
        }
    }

    async fn file_commit(&self, loc: &Location, changes: Vec<Change>) -> Result<(), StorageError> {
        tracing::trace!(file=%loc, command="file_commit");
        let mut files = self.files();
        let mut content = match files.get(&loc.file()) {
            Some(buf) => RecordFile::decode(buf)?,
            None => RecordFile::default(),
        };
        changes.into_iter().for_each(|c| content.apply(c));
        files.insert(loc.file(), content.encode()?);
        Ok(())
    }
}
