use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Change, StorageError};

/// Bumped when the on-disk layout changes
pub const RECORD_FORMAT_VERSION: u32 = 1;

/// How a privilege is assigned to a principal.
/// Serialized as the literal `"grant"` or `"deny"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Grant {
    Grant,
    Deny,
}

impl Grant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Deny => "deny",
        }
    }
}

impl From<Grant> for &'static str {
    fn from(value: Grant) -> Self {
        value.as_str()
    }
}

impl TryFrom<String> for Grant {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "grant" => Ok(Self::Grant),
            "deny" => Ok(Self::Deny),
            v => Err(format!("unknown grant value {:?}", v)),
        }
    }
}

/// Privileges of one principal on the resource.
/// A missing principal stands for the `all` group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalEntry {
    pub principal: Option<String>,
    #[serde(default)]
    pub privileges: BTreeMap<String, Grant>,
}

/// The ACL record of one resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRecord {
    pub path: String,
    /// Owner of the resource
    pub owner: Option<String>,
    #[serde(default)]
    pub entries: Vec<PrincipalEntry>,
}

impl AclRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            owner: None,
            entries: vec![],
        }
    }
}

/// Content of a record file: the records of all the resources of a directory,
/// indexed by resource path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordFile {
    records: BTreeMap<String, AclRecord>,
}

impl RecordFile {
    pub fn records(&self) -> impl Iterator<Item = &AclRecord> {
        self.records.values()
    }

    pub fn get(&self, path: &str) -> Option<&AclRecord> {
        self.records.get(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace the record bound to the same path
    pub fn upsert(&mut self, record: AclRecord) -> Option<AclRecord> {
        self.records.insert(record.path.clone(), record)
    }

    pub fn remove(&mut self, path: &str) -> Option<AclRecord> {
        self.records.remove(path)
    }

    pub fn apply(&mut self, change: Change) {
        match change {
            Change::Update(record) => {
                self.upsert(record);
            }
            Change::Remove(path) => {
                self.remove(&path);
            }
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        rmp_serde::to_vec_named(self).map_err(|e| StorageError::Internal(e.to_string()))
    }

    /// Bytes that are not a record file of our format version are reported
    /// as `Corrupted`. A well-formed file breaking the record contract
    /// (missing required field, several records for one path) is an `Integrity` error.
    pub fn decode(buf: &[u8]) -> Result<Self, StorageError> {
        let repr: RecordFileSerializedRepr = rmp_serde::from_slice(buf).map_err(|e| match e {
            rmp_serde::decode::Error::Syntax(msg) if msg.starts_with("missing field") => {
                StorageError::Integrity(msg)
            }
            e => StorageError::Corrupted(e.to_string()),
        })?;
        Self::from_repr(repr)
    }

    fn from_repr(val: RecordFileSerializedRepr) -> Result<Self, StorageError> {
        if val.version != RECORD_FORMAT_VERSION {
            return Err(StorageError::Corrupted(format!(
                "unsupported record format version {}",
                val.version
            )));
        }

        let mut file = RecordFile::default();
        for record in val.records.into_iter() {
            let path = record.path.clone();
            if file.upsert(record).is_some() {
                return Err(StorageError::Integrity(format!(
                    "several records for path {}",
                    path
                )));
            }
        }
        Ok(file)
    }
}

// CUSTOM SERIALIZATION & DESERIALIZATION
#[derive(Serialize, Deserialize)]
struct RecordFileSerializedRepr {
    version: u32,
    records: Vec<AclRecord>,
}

impl<'de> Deserialize<'de> for RecordFile {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val = RecordFileSerializedRepr::deserialize(d)?;
        Self::from_repr(val).map_err(serde::de::Error::custom)
    }
}

impl Serialize for RecordFile {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Records are written ordered by path
        let records = self.records.values().cloned().collect();
        let val = RecordFileSerializedRepr {
            version: RECORD_FORMAT_VERSION,
            records,
        };
        val.serialize(serializer)
    }
}

// ---- TESTS ----
