// ── File-backed profile store ──
//
// A JSON document `{ next_id, profiles }` mirrored by an in-memory store.
// Every mutation rewrites the document via temp file + rename; if the
// write fails the in-memory mutation is undone so both stay in step.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use super::{MemoryProfileStore, ProfileStore};
use crate::error::StoreError;
use crate::model::{GroupId, NewProfile, Profile, ProfileId};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    next_id: u64,
    #[serde(default)]
    profiles: Vec<Profile>,
}

pub struct FileProfileStore {
    path: PathBuf,
    inner: MemoryProfileStore,
    /// Serializes mutate-then-persist so documents hit disk in order.
    write_lock: Mutex<()>,
}

impl FileProfileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Document>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), profiles = doc.profiles.len(), "opened profile store");

        Ok(Self {
            inner: MemoryProfileStore::from_parts(doc.next_id, doc.profiles),
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<Vec<Profile>> {
        self.inner.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Profile>>> {
        self.inner.subscribe()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let doc = Document {
            next_id: self.inner.next_id(),
            profiles: self.inner.snapshot().as_ref().clone(),
        };
        let json = serde_json::to_string_pretty(&doc)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl ProfileStore for FileProfileStore {
    fn create(&self, new: NewProfile) -> Result<Profile, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let profile = self.inner.create(new)?;
        if let Err(e) = self.persist() {
            self.inner.forget(profile.id);
            return Err(e);
        }
        Ok(profile)
    }

    fn update(&self, profile: &Profile) -> Result<Profile, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self
            .inner
            .get_by_id(profile.id)?
            .ok_or(StoreError::Missing(profile.id))?;
        let updated = self.inner.update(profile)?;
        if let Err(e) = self.persist() {
            self.inner.restore(previous);
            return Err(e);
        }
        Ok(updated)
    }

    fn get_by_id(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        self.inner.get_by_id(id)
    }

    fn list_by_group(&self, group: GroupId) -> Result<Vec<Profile>, StoreError> {
        self.inner.list_by_group(group)
    }

    fn list_all(&self) -> Result<Vec<Profile>, StoreError> {
        self.inner.list_all()
    }

    fn delete(&self, id: ProfileId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(previous) = self.inner.get_by_id(id)? else {
            return Ok(false);
        };
        self.inner.delete(id)?;
        if let Err(e) = self.persist() {
            self.inner.restore(previous);
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ProxyConfig;
    use pretty_assertions::assert_eq;

    fn new_profile(name: &str) -> NewProfile {
        NewProfile {
            group_id: GroupId::DEFAULT,
            owner_identity: Some("owner".into()),
            display_name: name.into(),
            config: ProxyConfig::placeholder(name),
        }
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");

        let store = FileProfileStore::open(&path).unwrap();
        let a = store.create(new_profile("a")).unwrap();
        let b = store.create(new_profile("b")).unwrap();
        let mut renamed = a.clone();
        renamed.display_name = "a2".into();
        store.update(&renamed).unwrap();
        drop(store);

        let reopened = FileProfileStore::open(&path).unwrap();
        let all = reopened.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].display_name, "a2");
        assert_eq!(all[1].id, b.id);
    }

    #[test]
    fn deleted_ids_are_not_reissued_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");

        let store = FileProfileStore::open(&path).unwrap();
        store.create(new_profile("a")).unwrap();
        let b = store.create(new_profile("b")).unwrap();
        assert!(store.delete(b.id).unwrap());
        drop(store);

        let reopened = FileProfileStore::open(&path).unwrap();
        let c = reopened.create(new_profile("c")).unwrap();
        assert_eq!(c.id, ProfileId(3));
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::open(dir.path().join("nested/profiles.json")).unwrap();
        assert!(store.list_all().unwrap().is_empty());
        store.create(new_profile("a")).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn corrupt_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileProfileStore::open(&path),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn failed_write_rolls_back_memory() {
        let dir = tempfile::tempdir().unwrap();
        // The store path is a directory, so the final rename fails.
        let path = dir.path().join("occupied");
        fs::create_dir_all(path.join("child")).unwrap();

        let store = FileProfileStore {
            path: path.clone(),
            inner: MemoryProfileStore::new(),
            write_lock: Mutex::new(()),
        };
        assert!(store.create(new_profile("a")).is_err());
        assert!(store.list_all().unwrap().is_empty());
    }
}
