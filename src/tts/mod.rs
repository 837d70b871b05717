//! Speech synthesis.
//!
//! ```text
//!   final text + VoiceProfile ──▶ SpeechSynthesizer::synthesize ──▶ audio bytes
//!                                                                   + provider history id
//!   provider history id ────────▶ SpeechSynthesizer::fetch_history_audio ──▶ audio bytes
//! ```
//!
//! [`HttpSynthesizer`] talks to an ElevenLabs-compatible REST API.  The
//! scheduler only sees the trait, so tests swap in a double.

pub mod synthesizer;

pub use synthesizer::{
    voice_settings, HttpSynthesizer, SpeechSynthesizer, SynthesisError, SynthesizedAudio,
};
