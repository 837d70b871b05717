//! Generative processing: content moderation and voice direction.
//!
//! This module provides:
//! * [`TextGenerator`]: async trait for any chat-completion provider.
//! * [`ApiGenerator`]: OpenAI-compatible REST implementation.
//! * [`policy::resolve`]: layers global settings with a voice override.
//! * [`Moderator`]: runs the safety, topic, copyright and voice-direction
//!   prompts concurrently and folds them into a [`ModerationOutcome`].
//! * [`rules`]: the moderation rule catalogue and topic presets.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stream_tts::config::AppConfig;
//! use stream_tts::llm::{policy, ApiGenerator, Moderator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let moderator = Moderator::new(Arc::new(ApiGenerator::from_config(&config.generative)));
//!
//!     let voice = config.voice(None);
//!     if let Some(policy) = policy::resolve(&config.generative, voice, true) {
//!         let result = moderator.process("what a play!", &policy).await;
//!         println!("{:?}", result.outcome);
//!     }
//! }
//! ```

pub mod generator;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod preserve;
pub mod prompt;
pub mod rules;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use generator::{ApiGenerator, Generation, GenerationRequest, LlmError, TextGenerator, TokenUsage};
pub use orchestrator::{ModerationOutcome, ModerationReport, Moderated, Moderator};
pub use policy::{EffectiveGenerative, EffectiveModeration};
