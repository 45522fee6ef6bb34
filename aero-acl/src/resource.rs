use std::collections::BTreeMap;
use std::sync::Arc;

use aero_store::{fs::FsStore, AclRecord, Batch, Grant, Location, PrincipalEntry, StorageError, Store};

use crate::collection::PrivilegeCollection;
use crate::config::{AclConfig, MissingOwner};
use crate::error::AclError;
use crate::locate::{directory_context, ResourcePath};
use crate::principal::{Principal, Transaction};
use crate::privilege::{supported_privileges, Privilege, PrivilegeName};

/// Shared by all the resource ACLs of a server
pub struct AclRoot {
    pub config: AclConfig,
    pub storage: Store,
}

impl AclRoot {
    pub fn new(config: AclConfig, storage: Store) -> Arc<Self> {
        Arc::new(Self { config, storage })
    }

    /// Record files next to the resources, under `config.root`
    pub fn on_disk(config: AclConfig) -> Arc<Self> {
        Self::new(config, Box::new(FsStore::default()))
    }

    pub async fn open(self: &Arc<Self>, path: &str, principal: &Principal) -> Result<ResourceAcl, AclError> {
        ResourceAcl::open(self.clone(), path, principal).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AclState {
    /// No record is bound to the resource
    Absent,
    /// No record existed, a default one owned by the requester has just been written
    Bootstrapped,
    /// Bound to a record read from or written to the record file
    Loaded,
}

/// The ACL of one resource, bound to its record in the directory record file
pub struct ResourceAcl {
    root: Arc<AclRoot>,
    resource: ResourcePath,
    location: Location,
    collection: PrivilegeCollection,
    /// Last version of our record known to be committed
    record: Option<AclRecord>,
    state: AclState,
}

impl ResourceAcl {
    /// Load the ACL of the resource at `path`, or create and persist
    /// a default one owned by `principal` if the resource has none yet.
    pub async fn open(root: Arc<AclRoot>, path: &str, principal: &Principal) -> Result<Self, AclError> {
        let resource = ResourcePath::parse(path).map_err(|e| {
            tracing::error!(path=path, err=%e, "refused resource path");
            e
        })?;
        let location = directory_context(&root.config.root, &resource).await?;

        let mut acl = Self {
            root,
            resource,
            location,
            collection: PrivilegeCollection::default(),
            record: None,
            state: AclState::Absent,
        };

        match acl.fetch_record().await? {
            Some(record) => acl.load(record)?,
            None => acl.bootstrap(principal).await?,
        }
        Ok(acl)
    }

    pub fn resource(&self) -> &ResourcePath {
        &self.resource
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn state(&self) -> AclState {
        self.state
    }

    pub fn privilege_collection(&self) -> &PrivilegeCollection {
        &self.collection
    }

    pub fn supported_privilege_set(&self) -> &'static BTreeMap<&'static str, &'static str> {
        supported_privileges()
    }

    pub fn principal_collection_set(&self) -> &[String] {
        &self.root.config.principal_collection_set
    }

    /// Replace the whole ACL and persist it.
    /// The caller must have checked `write-acl` beforehand.
    pub async fn set_privilege_collection(
        &mut self,
        tx: &Transaction,
        collection: PrivilegeCollection,
    ) -> Result<(), AclError> {
        self.collection = collection;
        self.store(tx).await?;
        self.state = AclState::Loaded;
        Ok(())
    }

    /// Change the entry of one principal, on behalf of `tx.principal`
    /// who must hold `write-acl`.
    pub async fn edit_privilege(&mut self, tx: &Transaction, privilege: Privilege) -> Result<(), AclError> {
        self.collection
            .authorize(&tx.principal, PrivilegeName::WriteAcl.as_str())?;
        self.collection.set_privilege(privilege);
        self.store(tx).await?;
        self.state = AclState::Loaded;
        Ok(())
    }

    /// Delete the ACL of the resource, requires `write` on it
    /// as deleting the ACL goes with deleting the resource.
    pub async fn remove_collection(&mut self, tx: &Transaction) -> Result<(), AclError> {
        self.collection
            .authorize(&tx.principal, PrivilegeName::Write.as_str())?;

        let record = match self.record.take() {
            Some(r) => r,
            None => return Ok(()),
        };

        let mut batch = Batch::new(self.root.storage.as_ref(), self.location.clone());
        batch.remove(record.path.clone());
        if let Err(e) = batch.commit().await {
            self.record = Some(record);
            return Err(self.storage_error("remove", e));
        }

        tracing::debug!(path=%self.resource, principal=%tx.principal, "ACL removed");
        self.state = AclState::Absent;
        Ok(())
    }

    // ---- internals

    async fn fetch_record(&self) -> Result<Option<AclRecord>, AclError> {
        match self.root.storage.file_fetch(&self.location).await {
            Ok(file) => Ok(file.get(self.resource.as_str()).cloned()),
            Err(StorageError::NotFound) => {
                tracing::debug!(file=%self.location, "no record file yet");
                Ok(None)
            }
            Err(e) => Err(self.storage_error("fetch", e)),
        }
    }

    async fn bootstrap(&mut self, principal: &Principal) -> Result<(), AclError> {
        tracing::debug!(path=%self.resource, principal=%principal, "no ACL for resource, bootstrapping");
        self.collection = PrivilegeCollection::new(principal.clone());
        self.store(&Transaction::new(principal.clone())).await?;
        self.state = AclState::Bootstrapped;
        Ok(())
    }

    fn load(&mut self, record: AclRecord) -> Result<(), AclError> {
        let mut collection = PrivilegeCollection::default();

        match &record.owner {
            Some(owner) => collection.set_owner(Principal::new(owner.as_str())),
            None => match self.root.config.missing_owner {
                MissingOwner::Reject => {
                    let msg = format!("ACL record of {} in {} has no owner", record.path, self.location);
                    tracing::error!(path=%self.resource, file=%self.location, "ACL record without owner");
                    return Err(AclError::Integrity(msg));
                }
                MissingOwner::RepairOnWrite => {
                    tracing::warn!(path=%self.resource, "ACL record without owner, next writer will own it");
                }
            },
        }

        for entry in record.entries.iter() {
            collection.set_privilege(self.entry_to_privilege(entry));
        }

        self.collection = collection;
        self.record = Some(record);
        self.state = AclState::Loaded;
        Ok(())
    }

    fn entry_to_privilege(&self, entry: &PrincipalEntry) -> Privilege {
        let principal = entry
            .principal
            .as_deref()
            .map(Principal::new)
            .unwrap_or_else(Principal::all);

        let mut privilege = Privilege::new(principal);
        for (name, grant) in entry.privileges.iter() {
            let name: PrivilegeName = match name.parse() {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(path=%self.resource, err=%e, "ignoring persisted privilege");
                    continue;
                }
            };
            match grant {
                Grant::Grant => privilege.grant(name),
                Grant::Deny => privilege.deny(name),
            };
        }
        privilege
    }

    fn privilege_to_entry(privilege: &Privilege) -> PrincipalEntry {
        let granted = privilege.granted().map(|p| (p.as_str().to_string(), Grant::Grant));
        let denied = privilege.denied().map(|p| (p.as_str().to_string(), Grant::Deny));
        PrincipalEntry {
            principal: Some(privilege.principal().name().to_string()),
            // a denial overwrites a grant of the same name
            privileges: granted.chain(denied).collect(),
        }
    }

    /// Write our record, entries fully replaced, and commit.
    /// Other records of the file are left as they are.
    /// A persisted owner is kept, an ownerless record gets the collection
    /// owner or else `tx.principal`.
    /// On failure the in-memory collection is kept as is.
    async fn store(&mut self, tx: &Transaction) -> Result<(), AclError> {
        let mut record = match &self.record {
            Some(r) => r.clone(),
            None => AclRecord::new(self.resource.as_str()),
        };

        if record.owner.is_none() {
            let owner = match self.collection.owner() {
                Some(owner) => owner.clone(),
                None => {
                    tracing::warn!(path=%self.resource, principal=%tx.principal, "ownerless ACL now owned by its writer");
                    tx.principal.clone()
                }
            };
            record.owner = Some(owner.name().to_string());
        }
        record.entries = self
            .collection
            .entries()
            .map(Self::privilege_to_entry)
            .collect();

        let mut batch = Batch::new(self.root.storage.as_ref(), self.location.clone());
        batch.update(record.clone());
        batch
            .commit()
            .await
            .map_err(|e| self.storage_error("store", e))?;

        if self.collection.owner().is_none() {
            if let Some(owner) = record.owner.as_deref() {
                self.collection.set_owner(Principal::new(owner));
            }
        }
        tracing::debug!(path=%self.resource, file=%self.location, entries=record.entries.len(), "ACL stored");
        self.record = Some(record);
        Ok(())
    }

    fn storage_error(&self, op: &str, e: StorageError) -> AclError {
        tracing::error!(path=%self.resource, file=%self.location, op=op, err=%e, "ACL storage failed");
        e.into()
    }
}
