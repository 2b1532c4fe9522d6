// ── Domain model ──

mod ids;
mod profile;
mod proxy;

pub use ids::{GroupId, ProfileId};
pub use profile::{NewProfile, Profile};
pub use proxy::{ProxyConfig, ProxyKind};
