//! User-registered OpenAI-compatible endpoints and their projection into the
//! shared model shape.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::model_table::{ModelDescriptor, ModelTable, ProviderRef};

pub const CUSTOM_PROVIDER_KIND: &str = "custom-provider";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_vision: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Per-provider endpoint overrides, relative to `base_url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    /// Wire dialect of the endpoint, e.g. "openai" or "azure".
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,
    #[serde(default)]
    pub status: ProviderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_key_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_key_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<CustomModel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<CustomPaths>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_model: Option<String>,
}

fn default_provider_type() -> String {
    "openai".to_string()
}

impl CustomProviderConfig {
    pub fn is_active(&self) -> bool {
        self.status == ProviderStatus::Active
    }

    pub fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(&self.id, &self.name, CUSTOM_PROVIDER_KIND)
    }

    /// Enabled keys minus the ones explicitly disabled.
    pub fn usable_keys(&self) -> Vec<String> {
        let disabled: HashSet<&str> = self
            .disable_key_list
            .iter()
            .flatten()
            .map(|key| key.trim())
            .collect();
        self.enable_key_list
            .iter()
            .flatten()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty() && !disabled.contains(key))
            .map(str::to_string)
            .collect()
    }
}

/// Projects active providers' available models into descriptors.
pub fn project_custom_models(providers: &[CustomProviderConfig]) -> Vec<ModelDescriptor> {
    providers
        .iter()
        .filter(|provider| provider.is_active())
        .flat_map(|provider| {
            let provider_ref = Arc::new(provider.provider_ref());
            provider
                .models
                .iter()
                .flatten()
                .filter(|model| model.available)
                .map(move |model| {
                    let label = model.display_name.as_deref().unwrap_or(&model.name);
                    ModelDescriptor {
                        name: model.name.clone(),
                        available: true,
                        display_name: format!("{label} | {}", provider_ref.provider_name),
                        description: model.description.clone(),
                        provider: Some(provider_ref.clone()),
                        is_default: false,
                        enable_vision: model.enable_vision,
                    }
                })
        })
        .collect()
}

/// Custom-provider models first, then the table, de-duplicated by full key
/// with the first occurrence kept.
pub fn merge_with_table(providers: &[CustomProviderConfig], table: &ModelTable) -> Vec<ModelDescriptor> {
    let mut seen = HashSet::new();
    project_custom_models(providers)
        .into_iter()
        .chain(table.values().cloned())
        .filter(|model| seen.insert(model.key()))
        .collect()
}

/// Finds the descriptor a `model@provider` (or bare model) selection refers to.
pub fn find_selection<'a>(models: &'a [ModelDescriptor], selection: &str) -> Option<&'a ModelDescriptor> {
    if let Some(found) = models.iter().find(|model| model.key() == selection) {
        return Some(found);
    }
    models
        .iter()
        .find(|model| model.available && model.name == selection)
}
