//! Built-in provider and model catalogue
//!
//! The catalogue is embedded from `builtin_models.toml` at build time and seeds
//! every model table before directives are applied.

use serde::Deserialize;
use std::sync::{Arc, OnceLock};

use crate::core::model_table::{ModelDescriptor, ProviderRef};

#[derive(Debug, Clone, Deserialize)]
pub struct BuiltinProvider {
    pub id: String,
    pub provider_name: String,
    pub provider_type: String,
    pub base_url: String,
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BuiltinModelsConfig {
    providers: Vec<BuiltinProvider>,
}

impl BuiltinProvider {
    pub fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(&self.id, &self.provider_name, &self.provider_type)
    }
}

/// Load built-in providers from the embedded configuration
pub fn load_builtin_providers() -> &'static [BuiltinProvider] {
    static PROVIDERS: OnceLock<Vec<BuiltinProvider>> = OnceLock::new();
    PROVIDERS.get_or_init(|| {
        const CONFIG_CONTENT: &str = include_str!("../builtin_models.toml");
        let config: BuiltinModelsConfig =
            toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtin_models.toml");
        config.providers
    })
}

/// Find a built-in provider by ID (case-insensitive)
pub fn find_builtin_provider(id: &str) -> Option<&'static BuiltinProvider> {
    load_builtin_providers()
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

/// Every built-in model as a descriptor. Models of one provider share a
/// single `ProviderRef`.
pub fn default_models() -> Vec<ModelDescriptor> {
    load_builtin_providers()
        .iter()
        .flat_map(|provider| {
            let provider_ref = Arc::new(provider.provider_ref());
            provider
                .models
                .iter()
                .map(move |name| ModelDescriptor::new(name.clone(), Some(provider_ref.clone())))
        })
        .collect()
}
