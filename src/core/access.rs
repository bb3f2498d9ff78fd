//! Credential and policy snapshot consumed by the model table builder and the
//! header resolver.
//!
//! The snapshot is plain data: settings actions replace it wholesale and
//! in-flight requests keep reading whichever copy they started with.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::builtin_models::{default_models, find_builtin_provider};
use crate::core::custom_providers::{merge_with_table, CustomProviderConfig, CUSTOM_PROVIDER_KIND};
use crate::core::model_table::{build_model_table_with_default, ModelDescriptor, ModelTable};

pub const ACCESS_CODE_PREFIX: &str = "nk-";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceProvider {
    OpenAI,
    Azure,
    Google,
    Anthropic,
    DeepSeek,
    CustomProvider,
}

impl ServiceProvider {
    /// Maps a descriptor's provider type. Directive-synthesized `custom`
    /// models are served through the OpenAI endpoint.
    pub fn from_provider_type(provider_type: &str) -> Self {
        match provider_type.to_ascii_lowercase().as_str() {
            "azure" => ServiceProvider::Azure,
            "google" => ServiceProvider::Google,
            "anthropic" => ServiceProvider::Anthropic,
            "deepseek" => ServiceProvider::DeepSeek,
            CUSTOM_PROVIDER_KIND => ServiceProvider::CustomProvider,
            _ => ServiceProvider::OpenAI,
        }
    }

    pub fn from_model(model: &ModelDescriptor) -> Self {
        model
            .provider
            .as_deref()
            .map(|provider| Self::from_provider_type(&provider.provider_type))
            .unwrap_or(ServiceProvider::OpenAI)
    }

    pub fn id(self) -> &'static str {
        match self {
            ServiceProvider::OpenAI => "openai",
            ServiceProvider::Azure => "azure",
            ServiceProvider::Google => "google",
            ServiceProvider::Anthropic => "anthropic",
            ServiceProvider::DeepSeek => "deepseek",
            ServiceProvider::CustomProvider => CUSTOM_PROVIDER_KIND,
        }
    }
}

impl fmt::Display for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Policy pushed by the deployment's server side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerPolicy {
    pub custom_models: String,
    pub default_model: String,
    pub disable_gpt4: bool,
    /// Extra substrings that mark a model as vision-capable.
    pub vision_models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    pub openai_url: String,
    pub openai_api_key: String,
    pub azure_url: String,
    pub azure_api_key: String,
    pub azure_api_version: String,
    pub google_url: String,
    pub google_api_key: String,
    pub anthropic_url: String,
    pub anthropic_api_key: String,
    pub deepseek_url: String,
    pub deepseek_api_key: String,
    pub access_code: String,
    pub access_control_enabled: bool,
    /// Local model directives, applied after the server's.
    pub custom_models: String,
    pub default_model: String,
    /// Set for embedded app builds whose host handles Google auth.
    pub embedded_app: bool,
    pub server: ServerPolicy,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            openai_url: String::new(),
            openai_api_key: String::new(),
            azure_url: String::new(),
            azure_api_key: String::new(),
            azure_api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            google_url: String::new(),
            google_api_key: String::new(),
            anthropic_url: String::new(),
            anthropic_api_key: String::new(),
            deepseek_url: String::new(),
            deepseek_api_key: String::new(),
            access_code: String::new(),
            access_control_enabled: false,
            custom_models: String::new(),
            default_model: String::new(),
            embedded_app: false,
            server: ServerPolicy::default(),
        }
    }
}

impl AccessPolicy {
    pub fn stored_key(&self, provider: ServiceProvider) -> &str {
        match provider {
            ServiceProvider::Google => &self.google_api_key,
            ServiceProvider::Azure => &self.azure_api_key,
            ServiceProvider::Anthropic => &self.anthropic_api_key,
            ServiceProvider::DeepSeek => &self.deepseek_api_key,
            ServiceProvider::OpenAI => &self.openai_api_key,
            ServiceProvider::CustomProvider => "",
        }
    }

    /// Configured endpoint for a built-in provider, or its catalogue default.
    /// Azure deployments are per-tenant, so Azure has no default.
    pub fn base_url(&self, provider: ServiceProvider) -> String {
        let configured = match provider {
            ServiceProvider::OpenAI => &self.openai_url,
            ServiceProvider::Azure => return self.azure_url.trim().to_string(),
            ServiceProvider::Google => &self.google_url,
            ServiceProvider::Anthropic => &self.anthropic_url,
            ServiceProvider::DeepSeek => &self.deepseek_url,
            ServiceProvider::CustomProvider => return String::new(),
        };
        if !configured.trim().is_empty() {
            return configured.trim().to_string();
        }
        find_builtin_provider(provider.id())
            .map(|builtin| builtin.base_url.clone())
            .unwrap_or_default()
    }

    pub fn azure_api_version(&self) -> Option<&str> {
        let version = self.azure_api_version.trim();
        (!version.is_empty()).then_some(version)
    }

    pub fn has_access_code(&self) -> bool {
        !self.access_code.trim().is_empty()
    }

    /// Server directives followed by local ones, prefixed with the GPT-4
    /// disabling directives when the server asks for them.
    pub fn effective_directives(&self, defaults: &[ModelDescriptor]) -> String {
        let mut parts = Vec::new();
        if self.server.disable_gpt4 {
            parts.extend(
                defaults
                    .iter()
                    .filter(|model| is_gpt4_model(&model.name))
                    .map(|model| format!("-{}", model.name)),
            );
        }
        for directives in [&self.server.custom_models, &self.custom_models] {
            if !directives.trim().is_empty() {
                parts.push(directives.trim().to_string());
            }
        }
        parts.join(",")
    }

    pub fn effective_default_model(&self) -> &str {
        if self.server.default_model.trim().is_empty() {
            self.default_model.trim()
        } else {
            self.server.default_model.trim()
        }
    }

    pub fn model_table_from(&self, defaults: &[ModelDescriptor]) -> ModelTable {
        build_model_table_with_default(
            defaults,
            &self.effective_directives(defaults),
            self.effective_default_model(),
        )
    }

    pub fn model_table(&self) -> ModelTable {
        self.model_table_from(&default_models())
    }

    /// The full selectable model list: custom providers first, then the table.
    pub fn resolved_models(&self, custom_providers: &[CustomProviderConfig]) -> Vec<ModelDescriptor> {
        merge_with_table(custom_providers, &self.model_table())
    }
}

pub fn is_gpt4_model(name: &str) -> bool {
    (name.starts_with("gpt-4") || name.starts_with("chatgpt-4o") || name.starts_with("o1"))
        && !name.starts_with("gpt-4o-mini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model_table::ProviderRef;
    use std::sync::Arc;

    fn openai_models() -> Vec<ModelDescriptor> {
        let openai = Arc::new(ProviderRef::new("openai", "OpenAI", "openai"));
        ["gpt-4", "gpt-4o", "gpt-4o-mini", "o1", "gpt-3.5-turbo"]
            .into_iter()
            .map(|name| ModelDescriptor::new(name, Some(openai.clone())))
            .collect()
    }

    #[test]
    fn provider_type_mapping_routes_custom_models_to_openai() {
        assert_eq!(ServiceProvider::from_provider_type("custom"), ServiceProvider::OpenAI);
        assert_eq!(ServiceProvider::from_provider_type("Azure"), ServiceProvider::Azure);
        assert_eq!(
            ServiceProvider::from_provider_type(CUSTOM_PROVIDER_KIND),
            ServiceProvider::CustomProvider
        );
    }

    #[test]
    fn gpt4_detection_excludes_mini() {
        assert!(is_gpt4_model("gpt-4"));
        assert!(is_gpt4_model("gpt-4o"));
        assert!(is_gpt4_model("chatgpt-4o-latest"));
        assert!(is_gpt4_model("o1-mini"));
        assert!(!is_gpt4_model("gpt-4o-mini"));
        assert!(!is_gpt4_model("gpt-3.5-turbo"));
    }

    #[test]
    fn disable_gpt4_prepends_directives_before_custom_models() {
        let policy = AccessPolicy {
            custom_models: "+gpt-4o".to_string(),
            server: ServerPolicy {
                disable_gpt4: true,
                custom_models: "-gpt-3.5-turbo".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            policy.effective_directives(&openai_models()),
            "-gpt-4,-gpt-4o,-o1,-gpt-3.5-turbo,+gpt-4o"
        );

        let table = policy.model_table_from(&openai_models());
        assert!(!table.get("gpt-4@openai").unwrap().available);
        assert!(table.get("gpt-4o@openai").unwrap().available);
        assert!(table.get("gpt-4o-mini@openai").unwrap().available);
        assert!(!table.get("gpt-3.5-turbo@openai").unwrap().available);
    }

    #[test]
    fn server_default_model_wins_over_local() {
        let mut policy = AccessPolicy {
            default_model: "gpt-4".to_string(),
            ..Default::default()
        };
        assert_eq!(policy.effective_default_model(), "gpt-4");
        policy.server.default_model = "gpt-4o@openai".to_string();
        assert_eq!(policy.effective_default_model(), "gpt-4o@openai");

        let table = policy.model_table_from(&openai_models());
        assert_eq!(table.default_model().unwrap().name, "gpt-4o");
    }

    #[test]
    fn base_url_falls_back_to_catalogue() {
        let mut policy = AccessPolicy::default();
        assert_eq!(policy.base_url(ServiceProvider::OpenAI), "https://api.openai.com");
        policy.openai_url = " https://gateway.internal/ ".to_string();
        assert_eq!(policy.base_url(ServiceProvider::OpenAI), "https://gateway.internal/");
        assert_eq!(policy.base_url(ServiceProvider::Azure), "");
        assert_eq!(policy.azure_api_version(), Some(DEFAULT_AZURE_API_VERSION));
    }

    #[test]
    fn stored_keys_are_provider_specific() {
        let policy = AccessPolicy {
            openai_api_key: "sk-openai".to_string(),
            azure_api_key: "az-key".to_string(),
            google_api_key: "g-key".to_string(),
            ..Default::default()
        };
        assert_eq!(policy.stored_key(ServiceProvider::OpenAI), "sk-openai");
        assert_eq!(policy.stored_key(ServiceProvider::Azure), "az-key");
        assert_eq!(policy.stored_key(ServiceProvider::Google), "g-key");
        assert_eq!(policy.stored_key(ServiceProvider::CustomProvider), "");
    }
}
