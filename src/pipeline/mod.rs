//! Request pipeline and playback scheduler.
//!
//! # Architecture
//!
//! ```text
//! SchedulerHandle ──Command (mpsc)──▶ Scheduler::run()  ← one tokio task
//!                                        │
//!                                        ├─ QueueState   (work list, slot, paused)
//!                                        ├─ HistoryLog   (newest first, JSONL)
//!                                        │
//!                                        ├─ spawn: run_stages ─▶ synthesize
//!                                        │           sanitize → replace → limit → moderate
//!                                        │
//!                                        ├─ OverlayActuator::show / hide
//!                                        ├─ RefundActuator::refund
//!                                        └─ SchedulerEvent (mpsc) ─▶ transport
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stream_tts::config::AppConfig;
//! use stream_tts::pipeline::run_stages;
//!
//! # async fn example() {
//! let config = Arc::new(AppConfig::default());
//! // Without a moderator the generative stage is skipped.
//! let outcome = run_stages("<b>gg</b> chat", &config, config.voice(None), None).await;
//! println!("{outcome:?}");
//! # }
//! ```

pub mod history;
pub mod item;
pub mod runner;
pub mod stages;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use history::{HistoryEntry, HistoryLog, HistoryStatus, HistoryTiming};
pub use item::{EnqueueRequest, InsertPosition, ItemSource, ItemStatus, RequestItem};
pub use runner::{
    EnqueueAck, ModerationAction, Scheduler, SchedulerDeps, SchedulerError, SchedulerEvent,
    SchedulerHandle,
};
pub use stages::{run_stages, StageOutcome, StageRecord};
pub use state::{QueueItemView, QueueSnapshot, QueueState};
