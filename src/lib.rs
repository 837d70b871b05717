//! Chat-driven text-to-speech relay for live broadcasts.
//!
//! Viewer messages are sanitized, rewritten by replacement rules, length
//! limited, moderated by a generative text provider, synthesized, and
//! played back one at a time while an overlay shows what is being said.

pub mod actions;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod server;
pub mod text;
pub mod tts;
