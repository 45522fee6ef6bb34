use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use lazy_static::lazy_static;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::*;

lazy_static! {
    static ref FILE_LOCKS: std::sync::Mutex<HashMap<PathBuf, Weak<Mutex<()>>>> =
        std::sync::Mutex::new(HashMap::new());
}

/// Commits on the same record file are serialized inside this process.
/// Other processes writing in the same tree are not accounted for.
fn file_lock(file: &Path) -> Arc<Mutex<()>> {
    let mut locks = FILE_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(lock) = locks.get(file).and_then(Weak::upgrade) {
        return lock;
    }

    let lock = Arc::new(Mutex::new(()));
    locks.retain(|_, weak| weak.strong_count() > 0);
    locks.insert(file.to_path_buf(), Arc::downgrade(&lock));
    lock
}

/// Record files stored next to the resources they describe
#[derive(Clone, Debug, Default)]
pub struct FsStore {}

impl FsStore {
    async fn read(&self, file: &Path) -> Result<RecordFile, StorageError> {
        match tokio::fs::read(file).await {
            Ok(buf) => RecordFile::decode(&buf),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Write in a temporary file of the same directory then rename it over the
    /// record file, readers see either the old or the new version.
    async fn replace(&self, loc: &Location, buf: &[u8]) -> Result<(), StorageError> {
        let tmp = loc.dir().join(format!(
            "{}.{}.tmp",
            ACL_FILENAME,
            hex::encode(rand::random::<[u8; 8]>())
        ));

        let res = async {
            let mut f = tokio::fs::File::create(&tmp).await?;
            f.write_all(buf).await?;
            f.sync_all().await?;
            tokio::fs::rename(&tmp, loc.file()).await
        }
        .await;

        if let Err(e) = res {
            if let Err(rm_err) = tokio::fs::remove_file(&tmp).await {
                tracing::debug!(tmp=%tmp.display(), err=%rm_err, "unable to clean temporary record file");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl IStore for FsStore {
    async fn file_exists(&self, loc: &Location) -> Result<bool, StorageError> {
        match tokio::fs::metadata(loc.file()).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_fetch(&self, loc: &Location) -> Result<RecordFile, StorageError> {
        tracing::trace!(file=%loc, command="file_fetch");
        self.read(&loc.file()).await
    }

    async fn file_commit(&self, loc: &Location, changes: Vec<Change>) -> Result<(), StorageError> {
        tracing::trace!(file=%loc, command="file_commit");
        let file = loc.file();
        let lock = file_lock(&file);
        let _guard = lock.lock().await;

        let mut content = match self.read(&file).await {
            Ok(v) => v,
            Err(StorageError::NotFound) => RecordFile::default(),
            Err(e) => return Err(e),
        };
        changes.into_iter().for_each(|c| content.apply(c));

        let buf = content.encode()?;
        self.replace(loc, &buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::default();
        let loc = Location::in_dir(dir.path());

        assert!(!store.file_exists(&loc).await.unwrap());
        assert!(matches!(
            store.file_fetch(&loc).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn commit_creates_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::default();
        let loc = Location::in_dir(dir.path());

        let mut rec = AclRecord::new("/alice/calendar");
        rec.owner = Some("alice".into());
        store
            .file_commit(&loc, vec![Change::Update(rec.clone())])
            .await
            .unwrap();
        assert!(store.file_exists(&loc).await.unwrap());

        let other = AclRecord::new("/alice/calendar/a.ics");
        store
            .file_commit(&loc, vec![Change::Update(other.clone())])
            .await
            .unwrap();

        let content = store.file_fetch(&loc).await.unwrap();
        assert_eq!(content.get("/alice/calendar"), Some(&rec));
        assert_eq!(content.get("/alice/calendar/a.ics"), Some(&other));

        // no temporary file is left behind
        let mut names = vec![];
        let mut rd = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = rd.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec![ACL_FILENAME.to_string()]);
    }

    #[tokio::test]
    async fn corrupted_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::default();
        let loc = Location::in_dir(dir.path());
        tokio::fs::write(loc.file(), b"\xc1garbage").await.unwrap();

        let res = store
            .file_commit(&loc, vec![Change::Update(AclRecord::new("/x"))])
            .await;
        assert!(matches!(res, Err(StorageError::Corrupted(_))));
        assert_eq!(tokio::fs::read(loc.file()).await.unwrap(), b"\xc1garbage");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_keep_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let loc = Location::in_dir(dir.path());

        let mut handles = vec![];
        for i in 0..16 {
            let loc = loc.clone();
            handles.push(tokio::spawn(async move {
                let store = FsStore::default();
                store
                    .file_commit(&loc, vec![Change::Update(AclRecord::new(format!("/r{}", i)))])
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let content = FsStore::default().file_fetch(&loc).await.unwrap();
        assert_eq!(content.len(), 16);
    }
}
