use std::error::Error;

use crate::core::access::{AccessPolicy, ServiceProvider};
use crate::core::builtin_models::load_builtin_providers;
use crate::core::custom_providers::CustomProviderConfig;
use crate::core::platform::{ApiContext, ClientApi};

fn has_credentials(access: &AccessPolicy, provider: ServiceProvider) -> bool {
    !access.stored_key(provider).trim().is_empty()
        || (access.access_control_enabled && access.has_access_code())
}

pub fn format_custom_provider_row(provider: &CustomProviderConfig) -> String {
    let status = if provider.is_active() { "active" } else { "inactive" };
    let models = provider.models.as_ref().map_or(0, Vec::len);
    let keyed = if provider.api_key.trim().is_empty() && provider.usable_keys().is_empty() {
        "❌"
    } else {
        "✅"
    };
    format!(
        "| {} | {} | {} | {} | {} | {} |",
        provider.id, provider.name, provider.base_url, status, models, keyed
    )
}

pub fn list_providers(ctx: &ApiContext) -> Result<(), Box<dyn Error>> {
    println!("Built-in Providers:");
    println!();
    println!("| Provider | Display Name | URL | Authenticated |");
    println!("|---|---|---|:---:|");
    for builtin in load_builtin_providers() {
        let provider = ServiceProvider::from_provider_type(&builtin.provider_type);
        let url = ctx.access.base_url(provider);
        let auth = if has_credentials(&ctx.access, provider) {
            "✅"
        } else {
            "❌"
        };
        let url = if url.is_empty() { "(not configured)" } else { url.as_str() };
        println!(
            "| {} | {} | {} | {} |",
            builtin.id, builtin.provider_name, url, auth
        );
    }

    println!();
    if ctx.custom_providers.is_empty() {
        println!("No custom providers configured.");
        return Ok(());
    }

    println!("Custom Providers:");
    println!();
    println!("| Provider | Display Name | URL | Status | Models | Key |");
    println!("|---|---|---|---|---:|:---:|");
    for provider in ctx.custom_providers.iter() {
        println!("{}", format_custom_provider_row(provider));
    }
    Ok(())
}

pub async fn show_usage(ctx: ApiContext) -> Result<(), Box<dyn Error>> {
    let client = ClientApi::new(ServiceProvider::OpenAI, ctx);
    let usage = client.llm().usage().await?;
    println!("💳 Usage this month: ${:.2} of ${:.2}", usage.used, usage.total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::custom_providers::ProviderStatus;
    use crate::utils::test_utils::sample_custom_provider;

    #[test]
    fn custom_provider_rows_show_status_and_model_count() {
        let mut provider = sample_custom_provider("lab", "Lab");
        assert_eq!(
            format_custom_provider_row(&provider),
            "| lab | Lab | https://llm.lab.example | active | 2 | ✅ |"
        );

        provider.status = ProviderStatus::Inactive;
        provider.api_key.clear();
        provider.models = None;
        assert_eq!(
            format_custom_provider_row(&provider),
            "| lab | Lab | https://llm.lab.example | inactive | 0 | ❌ |"
        );
    }

    #[test]
    fn access_code_counts_as_credentials_only_with_access_control() {
        let mut access = AccessPolicy {
            access_code: "letmein".to_string(),
            ..Default::default()
        };
        assert!(!has_credentials(&access, ServiceProvider::OpenAI));
        access.access_control_enabled = true;
        assert!(has_credentials(&access, ServiceProvider::OpenAI));
    }
}
