use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::access::AccessPolicy;
use crate::core::custom_providers::CustomProviderConfig;
use crate::core::params::ModelConfig;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Bound on waiting for response headers; extended for reasoning models.
    pub request_timeout_ms: u64,
    pub access: AccessPolicy,
    pub model: ModelConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_providers: Vec<CustomProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            access: AccessPolicy::default(),
            model: ModelConfig::default(),
            custom_providers: Vec::new(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    /// Overlays environment variables onto the loaded settings. Empty values
    /// are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let access = &mut self.access;

        let string_overrides: [(&str, &mut String); 11] = [
            ("OPENAI_API_KEY", &mut access.openai_api_key),
            ("OPENAI_BASE_URL", &mut access.openai_url),
            ("AZURE_URL", &mut access.azure_url),
            ("AZURE_API_KEY", &mut access.azure_api_key),
            ("AZURE_API_VERSION", &mut access.azure_api_version),
            ("GOOGLE_API_KEY", &mut access.google_api_key),
            ("ANTHROPIC_API_KEY", &mut access.anthropic_api_key),
            ("DEEPSEEK_API_KEY", &mut access.deepseek_api_key),
            ("CUSTOM_MODELS", &mut access.custom_models),
            ("DEFAULT_MODEL", &mut access.default_model),
            ("ACCESS_CODE", &mut access.access_code),
        ];
        for (name, slot) in string_overrides {
            if let Some(value) = get(name) {
                *slot = value.trim().to_string();
            }
        }

        if get("ACCESS_CODE").is_some() {
            access.access_control_enabled = true;
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }
}

pub fn path_display(path: &Path) -> String {
    path.display().to_string()
}
