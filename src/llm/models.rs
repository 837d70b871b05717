//! Per-model request capabilities.
//!
//! OpenAI-compatible models disagree on which sampling parameters they
//! accept.  Reasoning models reject `temperature`, take
//! `max_completion_tokens`, and accept a `reasoning_effort` hint.

/// How a chat-completions request must be shaped for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Name of the output-length field in the request body.
    pub max_tokens_param: &'static str,
    pub supports_temperature: bool,
    /// Accepts `reasoning_effort`.
    pub is_reasoning: bool,
}

const REASONING: ModelCapabilities = ModelCapabilities {
    max_tokens_param: "max_completion_tokens",
    supports_temperature: false,
    is_reasoning: true,
};

const CLASSIC: ModelCapabilities = ModelCapabilities {
    max_tokens_param: "max_tokens",
    supports_temperature: true,
    is_reasoning: false,
};

const REALTIME: ModelCapabilities = ModelCapabilities {
    max_tokens_param: "max_completion_tokens",
    supports_temperature: false,
    is_reasoning: false,
};

/// Sampling temperature sent to models that accept one.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Look up the capabilities of `model`.  Unknown models are assumed to be
/// reasoning models, which is the most restrictive request shape.
///
/// ```
/// use stream_tts::llm::models::capabilities;
///
/// assert!(capabilities("gpt-5-nano").is_reasoning);
/// assert!(capabilities("gpt-4o-mini").supports_temperature);
/// assert!(!capabilities("gpt-realtime-mini").is_reasoning);
/// ```
pub fn capabilities(model: &str) -> ModelCapabilities {
    match model {
        "gpt-4o" | "gpt-4o-mini" => CLASSIC,
        m if m.starts_with("gpt-realtime") => REALTIME,
        _ => REASONING,
    }
}
