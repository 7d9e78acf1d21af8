//! Shared data types for the swarmlink federation core.
//!
//! This crate defines the causality primitive (vector clocks), replicated
//! change records, learning episodes, and the typed events emitted by the
//! hub and agent crates. It contains no I/O and no business logic.

pub mod clock;
pub mod episode;
pub mod event;
pub mod sync;

pub use clock::{ClockManager, ClockOrdering, VectorClock};
pub use episode::{EpisodeDraft, LearningEpisode, SUCCESS_REWARD_THRESHOLD};
pub use event::{FederationEvent, FederationEventKind};
pub use sync::{AgentConnection, HubStats, SyncOperation, SyncStats, SyncUpdate};
