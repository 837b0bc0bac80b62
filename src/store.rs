//! Keyed persistence of user records.
//!
//! Every mutation goes through the store's own lock, which is what serializes
//! concurrent verifications of the same user: [`RecordStore::advance_last_used`]
//! is a compare-and-swap that only ever moves the last used step forward.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::PathBuf,
    sync::{Mutex, RwLock},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{OtpError, Seed};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub identifier: String,
    pub public_key: String,
    pub seed: Seed,
    /// Highest time step a code has been accepted for
    pub last_used_step: Option<u64>,
    pub registered_at: u64,
}

pub trait RecordStore: Send + Sync {
    fn get(&self, identifier: &str) -> Result<Option<UserRecord>, OtpError>;

    /// Stores a record whose identifier is not taken yet.
    fn insert_new(&self, record: UserRecord) -> Result<(), OtpError>;

    /// Sets the last used step of `identifier` to `step` if it is higher than
    /// the stored one. Returns whether the value moved.
    fn advance_last_used(&self, identifier: &str, step: u64) -> Result<bool, OtpError>;

    fn len(&self) -> Result<usize, OtpError>;

    fn is_empty(&self) -> Result<bool, OtpError> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<T>(_: T) -> OtpError {
    OtpError::StorageUnavailable("record lock poisoned".into())
}

fn advance(record: &mut UserRecord, step: u64) -> bool {
    if record.last_used_step.is_some_and(|used| used >= step) {
        return false;
    }

    record.last_used_step = Some(step);
    true
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, identifier: &str) -> Result<Option<UserRecord>, OtpError> {
        Ok(self.records.read().map_err(poisoned)?.get(identifier).cloned())
    }

    fn insert_new(&self, record: UserRecord) -> Result<(), OtpError> {
        let mut records = self.records.write().map_err(poisoned)?;

        if records.contains_key(&record.identifier) {
            return Err(OtpError::AlreadyRegistered(record.identifier));
        }

        records.insert(record.identifier.clone(), record);
        Ok(())
    }

    fn advance_last_used(&self, identifier: &str, step: u64) -> Result<bool, OtpError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let record = records
            .get_mut(identifier)
            .ok_or_else(|| OtpError::UnknownUser(identifier.to_string()))?;

        Ok(advance(record, step))
    }

    fn len(&self) -> Result<usize, OtpError> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    records: Vec<UserRecord>,
}

/// A JSON document on disk, mirrored in memory.
///
/// Each mutation rewrites the whole document to a sibling temp file and
/// renames it over the original, so a crash leaves either the old or the
/// new state. The in-memory copy only changes once the rename succeeded.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: Mutex<HashMap<String, UserRecord>>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, OtpError> {
        let path = path.into();

        let records = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                error!(path = %path.display(), "failed to read record store: {e}");
                OtpError::StorageUnavailable(e.to_string())
            })?;
            let file: StoreFile = serde_json::from_str(&raw).map_err(|e| {
                error!(path = %path.display(), "record store is corrupted: {e}");
                OtpError::StorageUnavailable(format!("corrupted store: {e}"))
            })?;

            file.records
                .into_iter()
                .map(|r| (r.identifier.clone(), r))
                .collect()
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), records = records.len(), "opened record store");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn persist(&self, records: &HashMap<String, UserRecord>) -> Result<(), OtpError> {
        let mut sorted: Vec<UserRecord> = records.values().cloned().collect();
        sorted.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        let bytes = serde_json::to_vec_pretty(&StoreFile { records: sorted })
            .map_err(|e| OtpError::StorageUnavailable(e.to_string()))?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        };

        write().map_err(|e| {
            error!(path = %self.path.display(), "failed to persist record store: {e}");
            // Best effort, the original file is untouched either way
            let _ = fs::remove_file(&tmp_path);
            OtpError::StorageUnavailable(e.to_string())
        })
    }
}

impl RecordStore for FileStore {
    fn get(&self, identifier: &str) -> Result<Option<UserRecord>, OtpError> {
        Ok(self.records.lock().map_err(poisoned)?.get(identifier).cloned())
    }

    fn insert_new(&self, record: UserRecord) -> Result<(), OtpError> {
        let mut records = self.records.lock().map_err(poisoned)?;

        if records.contains_key(&record.identifier) {
            return Err(OtpError::AlreadyRegistered(record.identifier));
        }

        let mut next = records.clone();
        next.insert(record.identifier.clone(), record);
        self.persist(&next)?;

        *records = next;
        Ok(())
    }

    fn advance_last_used(&self, identifier: &str, step: u64) -> Result<bool, OtpError> {
        let mut records = self.records.lock().map_err(poisoned)?;

        let mut updated = records
            .get(identifier)
            .cloned()
            .ok_or_else(|| OtpError::UnknownUser(identifier.to_string()))?;

        if !advance(&mut updated, step) {
            return Ok(false);
        }

        let mut next = records.clone();
        next.insert(identifier.to_string(), updated);
        self.persist(&next)?;

        *records = next;
        Ok(true)
    }

    fn len(&self) -> Result<usize, OtpError> {
        Ok(self.records.lock().map_err(poisoned)?.len())
    }
}
