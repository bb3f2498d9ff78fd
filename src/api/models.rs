use std::sync::Arc;

use crate::api::{ModelInfo, ModelsResponse};
use crate::core::model_table::{ModelDescriptor, ProviderRef};

pub fn sort_models(models: &mut [ModelInfo]) {
    // Newest first. `created` is OpenAI-style, `created_at` Anthropic-style.
    models.sort_by(|a, b| {
        match (&a.created, &b.created, &a.created_at, &b.created_at) {
            (Some(a_created), Some(b_created), _, _) => b_created.cmp(a_created),
            (Some(_), None, _, _) => std::cmp::Ordering::Less,
            (None, Some(_), _, _) => std::cmp::Ordering::Greater,
            (None, None, Some(a_created_at), Some(b_created_at)) => b_created_at.cmp(a_created_at),
            (None, None, Some(_), None) => std::cmp::Ordering::Less,
            (None, None, None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None, None, None) => b.id.cmp(&a.id),
        }
    });
}

/// Remote model list as descriptors of the calling provider.
pub fn into_descriptors(response: ModelsResponse, provider: Arc<ProviderRef>) -> Vec<ModelDescriptor> {
    let mut models = response.data;
    sort_models(&mut models);
    models
        .into_iter()
        .map(|info| {
            let mut model = ModelDescriptor::new(info.id, Some(provider.clone()));
            if let Some(display_name) = info.display_name.filter(|name| !name.is_empty()) {
                model.display_name = display_name;
            }
            model
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, created: Option<u64>, created_at: Option<&str>) -> ModelInfo {
        ModelInfo {
            id: id.to_string(),
            created,
            created_at: created_at.map(str::to_string),
            owned_by: None,
            display_name: None,
        }
    }

    #[test]
    fn sort_prefers_newest_created_timestamp() {
        let mut models = vec![
            info("old", Some(1), None),
            info("undated", None, None),
            info("new", Some(5), None),
            info("dated", None, Some("2024-10-01")),
        ];
        sort_models(&mut models);
        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "dated", "undated"]);
    }

    #[test]
    fn descriptors_keep_remote_display_names() {
        let response: ModelsResponse = serde_json::from_str(
            r#"{"data":[{"id":"claude-x","display_name":"Claude X","created_at":"2025-01-01"},{"id":"plain"}]}"#,
        )
        .unwrap();
        let provider = Arc::new(ProviderRef::new("anthropic", "Anthropic", "anthropic"));
        let models = into_descriptors(response, provider);
        assert_eq!(models[0].display_name, "Claude X");
        assert_eq!(models[0].key(), "claude-x@anthropic");
        assert_eq!(models[1].display_name, "plain");
    }
}
