//! Learning episodes: the unit of knowledge agents share through the hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reward at or above this value marks an episode as successful.
pub const SUCCESS_REWARD_THRESHOLD: f64 = 0.7;

/// An episode as produced by a task, before storage assigns identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeDraft {
    /// The task the episode was recorded for.
    pub task: String,
    /// What the task was given.
    pub input: String,
    /// What the task produced.
    pub output: String,
    /// Scored outcome in `[0.0, 1.0]`.
    pub reward: f64,
    /// Optional self-critique of the outcome.
    pub critique: Option<String>,
}

impl EpisodeDraft {
    /// Create a draft without a critique.
    pub fn new(
        task: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        reward: f64,
    ) -> Self {
        Self {
            task: task.into(),
            input: input.into(),
            output: output.into(),
            reward,
            critique: None,
        }
    }

    /// Attach a critique to the draft.
    pub fn with_critique(mut self, critique: impl Into<String>) -> Self {
        self.critique = Some(critique.into());
        self
    }
}

/// A stored learning episode, tagged with its tenant.
///
/// `success` is derived from the reward at creation, never set directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningEpisode {
    /// Unique episode id.
    pub id: String,
    /// Tenant that owns the episode.
    pub tenant_id: String,
    /// The task the episode was recorded for.
    pub task: String,
    /// What the task was given.
    pub input: String,
    /// What the task produced.
    pub output: String,
    /// Scored outcome in `[0.0, 1.0]`.
    pub reward: f64,
    /// Optional self-critique of the outcome.
    pub critique: Option<String>,
    /// Whether the reward cleared [`SUCCESS_REWARD_THRESHOLD`].
    pub success: bool,
    /// When the episode was recorded.
    pub created_at: DateTime<Utc>,
}

impl LearningEpisode {
    /// Materialize a draft under a tenant, deriving `success`.
    pub fn from_draft(draft: EpisodeDraft, tenant_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            success: draft.reward >= SUCCESS_REWARD_THRESHOLD,
            task: draft.task,
            input: draft.input,
            output: draft.output,
            reward: draft.reward,
            critique: draft.critique,
            created_at: Utc::now(),
        }
    }
}
