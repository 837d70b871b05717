//! Request items and their lifecycle.
//!
//! ```text
//! Queued ──▶ Processing ──┬─▶ Playing ──▶ Lingering ──▶ (removed)
//!                         ├─▶ PendingModeration ──allow──▶ Queued (moderated)
//!                         │                     └─refund─▶ Blocked ──▶ (removed)
//!                         ├─▶ Blocked ──▶ (removed)
//!                         └─▶ Error   ──▶ (removed)
//! Queued | PendingModeration ──cancel──▶ Cancelled ──▶ (removed)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::ModerationReport;
use crate::text::TruncatedBy;
use crate::tts::SynthesizedAudio;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Processing,
    Playing,
    PendingModeration,
    Blocked,
    Error,
    Lingering,
    Cancelled,
}

impl ItemStatus {
    /// Waiting items: the ones `cancel` and `clear` may remove.
    pub fn is_waiting(self) -> bool {
        matches!(self, ItemStatus::Queued | ItemStatus::PendingModeration)
    }
}

/// Where an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    #[default]
    Normal,
    /// Re-played from history; skips the pipeline and history.
    Replay,
    /// Approved by the streamer after a block.
    Moderated,
}

/// Insert position for re-queued items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    /// Ahead of every other queued item.
    Front,
    #[default]
    Back,
}

/// An inbound speech request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnqueueRequest {
    pub text: String,
    pub alias: Option<String>,
    pub username: Option<String>,
    pub redemption_id: Option<String>,
    pub reward_id: Option<String>,
}

/// Text after each pipeline stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSnapshots {
    pub sanitized: Option<String>,
    pub replaced: Option<String>,
    pub truncated: Option<String>,
    pub moderated: Option<String>,
}

/// What the generative stage did, kept for history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModerationRecord {
    pub used: bool,
    pub tags_added: Vec<String>,
    pub rewrite_rejected: bool,
    pub report: Option<ModerationReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestItem {
    pub id: Uuid,
    /// Original text as received.
    pub text: String,
    pub alias: String,
    pub username: Option<String>,
    pub redemption_id: Option<String>,
    pub reward_id: Option<String>,
    pub status: ItemStatus,
    pub source: ItemSource,
    pub created_at: DateTime<Utc>,

    pub stages: StageSnapshots,
    /// Text handed to synthesis.
    pub final_text: Option<String>,
    pub sanitization_applied: Vec<String>,
    pub was_truncated: bool,
    pub truncated_by: Option<TruncatedBy>,
    pub moderation: ModerationRecord,
    pub block_reason: Option<String>,
    /// Approved by the streamer despite a block.
    pub moderation_override: bool,

    pub audio: Option<SynthesizedAudio>,
    /// Replay items only: drive the overlay while playing.
    pub use_show_hide: bool,
    pub refunded: bool,
    pub error: Option<String>,
}

impl RequestItem {
    pub fn new(request: EnqueueRequest, default_alias: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: request.text,
            alias: request
                .alias
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| default_alias.to_string()),
            username: request.username,
            redemption_id: request.redemption_id,
            reward_id: request.reward_id,
            status: ItemStatus::Queued,
            source: ItemSource::Normal,
            created_at: Utc::now(),
            stages: StageSnapshots::default(),
            final_text: None,
            sanitization_applied: Vec::new(),
            was_truncated: false,
            truncated_by: None,
            moderation: ModerationRecord::default(),
            block_reason: None,
            moderation_override: false,
            audio: None,
            use_show_hide: false,
            refunded: false,
            error: None,
        }
    }

    /// A replay of previously synthesized audio.
    pub fn replay(
        text: String,
        alias: String,
        username: Option<String>,
        audio: SynthesizedAudio,
        use_show_hide: bool,
    ) -> Self {
        Self {
            source: ItemSource::Replay,
            audio: Some(audio),
            use_show_hide,
            username,
            ..Self::new(
                EnqueueRequest {
                    text,
                    alias: Some(alias),
                    ..EnqueueRequest::default()
                },
                "",
            )
        }
    }

    /// Items whose audio already exists skip the transform pipeline.
    pub fn skips_pipeline(&self) -> bool {
        matches!(self.source, ItemSource::Replay | ItemSource::Moderated)
    }

    /// Whether playback drives the overlay.
    pub fn drives_overlay(&self) -> bool {
        match self.source {
            ItemSource::Normal | ItemSource::Moderated => true,
            ItemSource::Replay => self.use_show_hide,
        }
    }

    /// Whether leaving the queue produces a history entry.
    pub fn records_history(&self) -> bool {
        self.source != ItemSource::Replay
    }

    /// Text shown on the overlay.
    pub fn display_text(&self) -> &str {
        self.stages.sanitized.as_deref().unwrap_or(&self.text)
    }

    /// Text to synthesize when the streamer overrides a block.
    pub fn pre_moderation_text(&self) -> &str {
        self.stages
            .truncated
            .as_deref()
            .or(self.stages.replaced.as_deref())
            .unwrap_or(&self.text)
    }
}
