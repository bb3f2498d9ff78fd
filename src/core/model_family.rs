//! Capability flags derived from a model's name.

use crate::core::model_table::ModelDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReasoningKind {
    #[default]
    None,
    /// o1/o3/o4-mini: no system prompt, penalties pinned to zero.
    ReasoningOnly,
    /// gpt-5: sampling parameters are rejected outright.
    ReasoningSummarizer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelCapabilities {
    pub vision: bool,
    pub forbids_system: bool,
    pub requires_alternation: bool,
    pub extended_timeout: bool,
    pub reasoning: ReasoningKind,
}

const VISION_PATTERNS: &[&str] = &[
    "vision",
    "gpt-4o",
    "gpt-4.1",
    "claude-3",
    "claude-sonnet-4",
    "claude-opus-4",
    "gemini-1.5",
    "gemini-exp",
    "gemini-2",
    "learnlm",
    "qwen-vl",
    "qwen2-vl",
    "glm-4v",
    "-vl",
    "o3",
    "o4-mini",
    "gpt-5",
];

const VISION_EXCLUSIONS: &[&str] = &["claude-3-5-haiku"];

impl ModelCapabilities {
    pub fn for_model(name: &str, extra_vision_patterns: &[String]) -> Self {
        let lower = name.to_ascii_lowercase();
        let reasoning = reasoning_kind(&lower);
        Self {
            vision: is_vision_model(&lower, extra_vision_patterns),
            forbids_system: reasoning == ReasoningKind::ReasoningOnly,
            requires_alternation: lower.starts_with("claude")
                || lower == "deepseek-reasoner"
                || lower.starts_with("deepseek-r1"),
            extended_timeout: reasoning != ReasoningKind::None
                || lower.contains("-thinking")
                || lower.contains("deepseek-r")
                || lower.contains("reasoner"),
            reasoning,
        }
    }

    /// Same as [`ModelCapabilities::for_model`], honouring the descriptor's
    /// explicit vision flag when present.
    pub fn for_descriptor(model: &ModelDescriptor, extra_vision_patterns: &[String]) -> Self {
        let mut caps = Self::for_model(&model.name, extra_vision_patterns);
        if let Some(vision) = model.enable_vision {
            caps.vision = vision;
        }
        caps
    }
}

fn reasoning_kind(lower: &str) -> ReasoningKind {
    if lower.starts_with("gpt-5") {
        ReasoningKind::ReasoningSummarizer
    } else if lower.starts_with("o1") || lower.starts_with("o3") || lower.starts_with("o4-mini") {
        ReasoningKind::ReasoningOnly
    } else {
        ReasoningKind::None
    }
}

fn is_vision_model(lower: &str, extra: &[String]) -> bool {
    if extra
        .iter()
        .map(|pattern| pattern.trim().to_ascii_lowercase())
        .any(|pattern| !pattern.is_empty() && lower.contains(&pattern))
    {
        return true;
    }
    if VISION_EXCLUSIONS.iter().any(|p| lower.contains(p)) {
        return false;
    }
    if lower.contains("gpt-4-turbo") && !lower.contains("preview") {
        return true;
    }
    VISION_PATTERNS.iter().any(|p| lower.contains(p))
}
