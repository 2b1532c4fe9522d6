// ── Profile storage ──
//
// The engine only needs create / read / update / list-by-group. `delete`
// exists for the explicit user action and is never called during a
// reconciliation pass.

mod file;
mod memory;

pub use file::FileProfileStore;
pub use memory::MemoryProfileStore;

use crate::error::StoreError;
use crate::model::{GroupId, NewProfile, Profile, ProfileId};

/// Durable keyed storage of profiles.
///
/// Listing order is insertion order: ids are assigned monotonically and
/// never reused.
pub trait ProfileStore: Send + Sync {
    fn create(&self, new: NewProfile) -> Result<Profile, StoreError>;

    /// Replace a stored profile wholesale. The store refreshes `updated_at`.
    fn update(&self, profile: &Profile) -> Result<Profile, StoreError>;

    fn get_by_id(&self, id: ProfileId) -> Result<Option<Profile>, StoreError>;

    fn list_by_group(&self, group: GroupId) -> Result<Vec<Profile>, StoreError>;

    fn list_all(&self) -> Result<Vec<Profile>, StoreError>;

    /// Returns `true` if a profile was removed.
    fn delete(&self, id: ProfileId) -> Result<bool, StoreError>;
}
