//! Model table construction.
//!
//! The table merges the built-in model catalogue with the comma-separated
//! customization directives pushed by the server and set locally. Building is a
//! pure rebuild: callers swap the whole table rather than mutating a live one.
//!
//! Directive grammar, one token per comma-separated item:
//!
//! ```text
//! [+|-]all                      toggle every entry
//! [+|-]*providerId              toggle every entry of one provider
//! [+|-]name[@provider][=Display Name][<description>]
//! ```

use std::collections::HashMap;
use std::sync::Arc;

pub const CUSTOM_PROVIDER_TYPE: &str = "custom";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderRef {
    pub id: String,
    pub provider_name: String,
    pub provider_type: String,
}

impl ProviderRef {
    pub fn new(
        id: impl Into<String>,
        provider_name: impl Into<String>,
        provider_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider_name: provider_name.into(),
            provider_type: provider_type.into(),
        }
    }

    /// Provider synthesized for a directive naming a model nobody ships.
    pub fn custom(provider_name: &str) -> Self {
        Self::new(
            provider_name.to_lowercase(),
            provider_name,
            CUSTOM_PROVIDER_TYPE,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub name: String,
    pub available: bool,
    pub display_name: String,
    pub description: Option<String>,
    pub provider: Option<Arc<ProviderRef>>,
    pub is_default: bool,
    pub enable_vision: Option<bool>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, provider: Option<Arc<ProviderRef>>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            available: true,
            description: None,
            provider,
            is_default: false,
            enable_vision: None,
        }
    }

    pub fn key(&self) -> String {
        model_key(&self.name, self.provider.as_deref())
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider.as_deref().map(|provider| provider.id.as_str())
    }
}

/// `name@providerId`, or the bare name for provider-less descriptors.
pub fn model_key(name: &str, provider: Option<&ProviderRef>) -> String {
    match provider {
        Some(provider) => format!("{name}@{}", provider.id),
        None => name.to_string(),
    }
}

/// Splits `model@provider` on the last `@`.
pub fn split_model_key(key: &str) -> (&str, Option<&str>) {
    match key.rsplit_once('@') {
        Some((model, provider)) => (model, Some(provider)),
        None => (key, None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    AvailabilityAll {
        available: bool,
    },
    AvailabilityByProvider {
        provider_id: String,
        available: bool,
    },
    ModelOverride {
        model: String,
        provider: Option<String>,
        available: bool,
        display_name: Option<String>,
        description: Option<String>,
    },
}

/// Parses a single token. Empty tokens yield `None`; anything else that does
/// not fit the grammar is taken as a bare model name.
pub fn parse_directive(token: &str) -> Option<Directive> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let (available, body) = match token.as_bytes()[0] {
        b'-' => (false, &token[1..]),
        b'+' => (true, &token[1..]),
        _ => (true, token),
    };
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if body == "all" {
        return Some(Directive::AvailabilityAll { available });
    }
    if let Some(provider_id) = body.strip_prefix('*') {
        if !provider_id.is_empty() {
            return Some(Directive::AvailabilityByProvider {
                provider_id: provider_id.to_string(),
                available,
            });
        }
    }

    let (head, description) = match (body.find('<'), body.ends_with('>')) {
        (Some(open), true) => (&body[..open], non_empty(&body[open + 1..body.len() - 1])),
        _ => (body, None),
    };
    let (name, display_name) = match head.split_once('=') {
        Some((name, display)) => (name.trim(), non_empty(display)),
        None => (head.trim(), None),
    };
    if name.is_empty() {
        return None;
    }

    let (model, provider) = split_model_key(name);
    Some(Directive::ModelOverride {
        model: model.to_string(),
        provider: provider.filter(|p| !p.is_empty()).map(str::to_string),
        available,
        display_name,
        description,
    })
}

pub fn parse_directives(input: &str) -> Vec<Directive> {
    input.split(',').filter_map(parse_directive).collect()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Insertion-ordered map from full model key to resolved descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTable {
    entries: Vec<(String, ModelDescriptor)>,
    index: HashMap<String, usize>,
}

impl ModelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ModelDescriptor> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut ModelDescriptor> {
        self.index.get(key).map(|&i| &mut self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelDescriptor)> {
        self.entries.iter().map(|(key, model)| (key.as_str(), model))
    }

    pub fn values(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.entries.iter().map(|(_, model)| model)
    }

    pub fn into_values(self) -> Vec<ModelDescriptor> {
        self.entries.into_iter().map(|(_, model)| model).collect()
    }

    pub fn default_model(&self) -> Option<&ModelDescriptor> {
        self.values().find(|model| model.is_default)
    }

    /// Merges a descriptor into the table. An existing entry takes the new
    /// availability but keeps its display name and description when set.
    pub fn merge(&mut self, model: ModelDescriptor) {
        let key = model.key();
        match self.get_mut(&key) {
            Some(existing) => {
                existing.available = model.available;
                if existing.display_name.is_empty() {
                    existing.display_name = model.display_name;
                }
                if existing.description.is_none() {
                    existing.description = model.description;
                }
                if existing.enable_vision.is_none() {
                    existing.enable_vision = model.enable_vision;
                }
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, model));
            }
        }
    }

    pub fn apply(&mut self, directive: &Directive) {
        match directive {
            Directive::AvailabilityAll { available } => {
                for (_, model) in &mut self.entries {
                    model.available = *available;
                }
            }
            Directive::AvailabilityByProvider {
                provider_id,
                available,
            } => {
                for (_, model) in &mut self.entries {
                    if model.provider_id() == Some(provider_id.as_str()) {
                        model.available = *available;
                    }
                }
            }
            Directive::ModelOverride {
                model,
                provider,
                available,
                display_name,
                description,
            } => {
                let mut matched = 0usize;
                for (key, entry) in &mut self.entries {
                    let (model_name, key_provider) = split_model_key(key);
                    if model_name != model {
                        continue;
                    }
                    if let Some(wanted) = provider {
                        if !provider_matches(wanted, key_provider, entry) {
                            continue;
                        }
                    }
                    matched += 1;
                    entry.available = *available;
                    if let Some(display_name) = display_name {
                        entry.display_name = display_name.clone();
                    }
                    if let Some(description) = description {
                        entry.description = Some(description.clone());
                    }
                }

                if matched == 0 {
                    let provider = ProviderRef::custom(provider.as_deref().unwrap_or(model.as_str()));
                    let mut synthesized =
                        ModelDescriptor::new(model.clone(), Some(Arc::new(provider)));
                    synthesized.available = *available;
                    if let Some(display_name) = display_name {
                        synthesized.display_name = display_name.clone();
                    }
                    synthesized.description = description.clone();
                    self.merge(synthesized);
                }
            }
        }
    }

    /// Marks one entry as the default, clearing any previous mark.
    pub fn select_default(&mut self, selector: &str) {
        for (_, model) in &mut self.entries {
            model.is_default = false;
        }

        let selector = selector.trim();
        if selector.is_empty() {
            return;
        }

        if selector.contains('@') {
            if let Some(model) = self.get_mut(selector) {
                model.is_default = true;
            }
            return;
        }

        if let Some((_, model)) = self
            .entries
            .iter_mut()
            .find(|(key, model)| model.available && split_model_key(key).0 == selector)
        {
            model.is_default = true;
        }
    }
}

fn provider_matches(wanted: &str, key_provider: Option<&str>, entry: &ModelDescriptor) -> bool {
    key_provider.is_some_and(|p| p.eq_ignore_ascii_case(wanted))
        || entry
            .provider
            .as_deref()
            .is_some_and(|p| p.provider_name == wanted)
}

pub fn build_model_table(default_models: &[ModelDescriptor], directives: &str) -> ModelTable {
    let mut table = ModelTable::new();
    for model in default_models {
        let mut seeded = model.clone();
        seeded.is_default = false;
        if seeded.display_name.is_empty() {
            seeded.display_name = seeded.name.clone();
        }
        table.merge(seeded);
    }

    for directive in parse_directives(directives) {
        table.apply(&directive);
    }
    table
}

pub fn build_model_table_with_default(
    default_models: &[ModelDescriptor],
    directives: &str,
    default_selector: &str,
) -> ModelTable {
    let mut table = build_model_table(default_models, directives);
    table.select_default(default_selector);
    table
}

/// True unless `model` is available under at least one of `provider_ids`.
pub fn is_model_not_available(
    default_models: &[ModelDescriptor],
    directives: &str,
    model: &str,
    provider_ids: &[&str],
) -> bool {
    let table = build_model_table(default_models, directives);
    !provider_ids.iter().any(|provider| {
        table
            .get(&format!("{model}@{}", provider.to_lowercase()))
            .is_some_and(|entry| entry.available)
    })
}
