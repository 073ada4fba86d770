//! Seeding policies and their background enforcement.

mod enforcer;
mod store;
mod types;

pub use enforcer::SeedingEnforcer;
pub use store::{PolicyStore, SqlitePolicyStore};
pub use types::{
    resolve_effective, DownloadSeedingPolicy, EffectivePolicy, PolicyAction, PolicyError,
    SeedingPolicy,
};
