// ── In-memory profile store ──
//
// Concurrent map keyed by id, with a watch channel carrying the full
// sorted snapshot after every mutation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;

use super::ProfileStore;
use crate::error::StoreError;
use crate::model::{GroupId, NewProfile, Profile, ProfileId};

pub struct MemoryProfileStore {
    profiles: DashMap<ProfileId, Profile>,
    next_id: AtomicU64,
    snapshot: watch::Sender<Arc<Vec<Profile>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::from_parts(1, Vec::new())
    }

    /// Rebuild a store from persisted state. `next_id` is raised past every
    /// existing id so ids are never reissued.
    pub fn from_parts(next_id: u64, profiles: Vec<Profile>) -> Self {
        let floor = profiles.iter().map(|p| p.id.0 + 1).max().unwrap_or(1);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let store = Self {
            profiles: profiles.into_iter().map(|p| (p.id, p)).collect(),
            next_id: AtomicU64::new(next_id.max(floor)),
            snapshot,
        };
        store.rebuild_snapshot();
        store
    }

    /// The id the next `create` will assign.
    pub fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Current snapshot (cheap `Arc` clone), sorted by id.
    pub fn snapshot(&self) -> Arc<Vec<Profile>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Profile>>> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Put back a profile exactly as it was. Used to undo a mutation
    /// whose persistence failed.
    pub(crate) fn restore(&self, profile: Profile) {
        self.profiles.insert(profile.id, profile);
        self.rebuild_snapshot();
    }

    pub(crate) fn forget(&self, id: ProfileId) {
        self.profiles.remove(&id);
        self.rebuild_snapshot();
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn sorted(&self, filter: impl Fn(&Profile) -> bool) -> Vec<Profile> {
        let mut out: Vec<Profile> = self
            .profiles
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|p| p.id);
        out
    }

    fn rebuild_snapshot(&self) {
        let all = self.sorted(|_| true);
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(all));
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn create(&self, new: NewProfile) -> Result<Profile, StoreError> {
        let id = ProfileId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let profile = new.into_profile(id, Utc::now());
        self.profiles.insert(id, profile.clone());
        self.rebuild_snapshot();
        Ok(profile)
    }

    fn update(&self, profile: &Profile) -> Result<Profile, StoreError> {
        let updated = {
            let mut slot = self
                .profiles
                .get_mut(&profile.id)
                .ok_or(StoreError::Missing(profile.id))?;
            let mut updated = profile.clone();
            updated.created_at = slot.created_at;
            updated.updated_at = Utc::now();
            *slot = updated.clone();
            updated
        };
        self.rebuild_snapshot();
        Ok(updated)
    }

    fn get_by_id(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.get(&id).map(|entry| entry.value().clone()))
    }

    fn list_by_group(&self, group: GroupId) -> Result<Vec<Profile>, StoreError> {
        Ok(self.sorted(|p| p.group_id == group))
    }

    fn list_all(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.sorted(|_| true))
    }

    fn delete(&self, id: ProfileId) -> Result<bool, StoreError> {
        let removed = self.profiles.remove(&id).is_some();
        if removed {
            self.rebuild_snapshot();
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ProxyConfig;

    fn new_profile(group: u64, name: &str) -> NewProfile {
        NewProfile {
            group_id: GroupId(group),
            owner_identity: Some("owner".into()),
            display_name: name.into(),
            config: ProxyConfig::placeholder(name),
        }
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let store = MemoryProfileStore::new();
        let a = store.create(new_profile(1, "a")).unwrap();
        let b = store.create(new_profile(1, "b")).unwrap();
        assert!(store.delete(b.id).unwrap());
        let c = store.create(new_profile(1, "c")).unwrap();
        assert_eq!(a.id, ProfileId(1));
        assert_eq!(b.id, ProfileId(2));
        assert_eq!(c.id, ProfileId(3));
    }

    #[test]
    fn list_by_group_is_insertion_ordered() {
        let store = MemoryProfileStore::new();
        for (group, name) in [(1, "a"), (2, "x"), (1, "b"), (1, "c")] {
            store.create(new_profile(group, name)).unwrap();
        }
        let names: Vec<String> = store
            .list_by_group(GroupId(1))
            .unwrap()
            .into_iter()
            .map(|p| p.display_name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn update_keeps_created_at() {
        let store = MemoryProfileStore::new();
        let created = store.create(new_profile(1, "a")).unwrap();
        let mut changed = created.clone();
        changed.display_name = "renamed".into();
        let updated = store.update(&changed).unwrap();
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(
            store.get_by_id(created.id).unwrap().unwrap().display_name,
            "renamed"
        );
    }

    #[test]
    fn update_of_missing_profile_fails() {
        let store = MemoryProfileStore::new();
        let orphan = new_profile(1, "ghost").into_profile(ProfileId(42), Utc::now());
        assert!(matches!(
            store.update(&orphan),
            Err(StoreError::Missing(ProfileId(42)))
        ));
    }

    #[test]
    fn snapshot_tracks_mutations() {
        let store = MemoryProfileStore::new();
        let rx = store.subscribe();
        store.create(new_profile(1, "a")).unwrap();
        assert_eq!(rx.borrow().len(), 1);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn from_parts_raises_next_id_past_existing() {
        let existing = new_profile(1, "a").into_profile(ProfileId(10), Utc::now());
        let store = MemoryProfileStore::from_parts(3, vec![existing]);
        assert_eq!(store.next_id(), 11);
        let created = store.create(new_profile(1, "b")).unwrap();
        assert_eq!(created.id, ProfileId(11));
    }
}
