//! Local episode storage for swarmlink agents.
//!
//! Each agent owns one [`EpisodeStore`]: an SQLite database (in-memory by
//! default, file-backed when a path is configured) holding the agent's
//! learning episodes. The store doubles as the sync staging area: locally
//! written episodes queue for push until marked synced, and remote updates
//! land through [`EpisodeStore::apply_update`] with last-write-wins
//! resolution by timestamp.

pub mod error;
pub mod migration;
pub mod store;

pub use error::{MemoryError, MemoryResult};
pub use store::EpisodeStore;
