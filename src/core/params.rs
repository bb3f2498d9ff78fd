//! Generation parameters and the outgoing chat payload.

use serde::{Deserialize, Serialize};

use crate::api::ChatRequest;
use crate::core::model_family::{ModelCapabilities, ReasoningKind};
use crate::core::message::RequestMessage;

pub const VISION_MIN_MAX_TOKENS: u32 = 4000;

/// Model settings as stored globally or per session. Each numeric parameter
/// is only sent when its `*_enabled` flag is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub provider_name: String,
    pub temperature: f32,
    pub temperature_enabled: bool,
    pub top_p: f32,
    pub top_p_enabled: bool,
    pub max_tokens: u32,
    pub max_tokens_enabled: bool,
    pub presence_penalty: f32,
    pub presence_penalty_enabled: bool,
    pub frequency_penalty: f32,
    pub frequency_penalty_enabled: bool,
    pub stream: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            provider_name: "OpenAI".to_string(),
            temperature: 0.5,
            temperature_enabled: true,
            top_p: 1.0,
            top_p_enabled: true,
            max_tokens: 4000,
            max_tokens_enabled: false,
            presence_penalty: 0.0,
            presence_penalty_enabled: true,
            frequency_penalty: 0.0,
            frequency_penalty_enabled: true,
            stream: true,
        }
    }
}

/// Call-site overrides applied on top of the merged model config.
#[derive(Debug, Clone, Default)]
pub struct CallConfig {
    pub model: Option<String>,
    pub provider_name: Option<String>,
    pub stream: Option<bool>,
}

/// Frozen per-request configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    model_config: ModelConfig,
}

impl LlmConfig {
    /// Global settings, replaced by the session's copy when it has one, then
    /// the call-site model/provider/stream choices.
    pub fn merged(global: &ModelConfig, session: Option<&ModelConfig>, call: CallConfig) -> Self {
        let mut model_config = session.unwrap_or(global).clone();
        if let Some(model) = call.model {
            model_config.model = model;
        }
        if let Some(provider_name) = call.provider_name {
            model_config.provider_name = provider_name;
        }
        if let Some(stream) = call.stream {
            model_config.stream = stream;
        }
        Self { model_config }
    }

    pub fn model(&self) -> &str {
        &self.model_config.model
    }

    pub fn provider_name(&self) -> &str {
        &self.model_config.provider_name
    }

    pub fn stream(&self) -> bool {
        self.model_config.stream
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }
}

/// Applies the `*_enabled` gating, then the model-family exceptions.
pub fn build_chat_payload(
    config: &LlmConfig,
    caps: &ModelCapabilities,
    messages: Vec<RequestMessage>,
) -> ChatRequest {
    let mc = config.model_config();
    let mut request = ChatRequest {
        model: mc.model.clone(),
        messages,
        stream: mc.stream,
        temperature: mc.temperature_enabled.then_some(mc.temperature),
        top_p: mc.top_p_enabled.then_some(mc.top_p),
        presence_penalty: mc.presence_penalty_enabled.then_some(mc.presence_penalty),
        frequency_penalty: mc.frequency_penalty_enabled.then_some(mc.frequency_penalty),
        max_tokens: mc.max_tokens_enabled.then_some(mc.max_tokens),
        max_completion_tokens: None,
    };

    match caps.reasoning {
        ReasoningKind::ReasoningOnly => {
            request.presence_penalty = Some(0.0);
            request.frequency_penalty = Some(0.0);
            request.temperature = request.temperature.map(|_| 1.0);
            request.top_p = request.top_p.map(|_| 1.0);
            request.max_completion_tokens = request.max_tokens.take();
        }
        ReasoningKind::ReasoningSummarizer => {
            request.presence_penalty = None;
            request.frequency_penalty = None;
            request.temperature = None;
            request.top_p = None;
            request.max_completion_tokens = request.max_tokens.take();
        }
        ReasoningKind::None => {
            if caps.vision {
                request.max_tokens = request
                    .max_tokens
                    .map(|tokens| tokens.max(VISION_MIN_MAX_TOKENS));
            }
        }
    }

    request
}
