//! Model listing functionality
//!
//! `models` prints the locally resolved table; `remote-models` asks a
//! provider's API.

use std::error::Error;

use crate::core::model_table::ModelDescriptor;
use crate::core::platform::{ApiContext, ClientApi};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

pub fn format_model_line(model: &ModelDescriptor) -> String {
    let marker = if model.is_default { "*" } else { " " };
    let mut line = format!("{marker} {:<44} {}", model.key(), model.display_name);
    if !model.available {
        line.push_str(" (disabled)");
    }
    line
}

pub fn list_models(ctx: &ApiContext, all: bool) -> Result<(), Box<dyn Error>> {
    let models = ctx.resolved_models();
    let shown: Vec<&ModelDescriptor> = models
        .iter()
        .filter(|model| all || model.available)
        .collect();

    println!("🤖 Available Models");
    println!("{RULE}");
    println!();

    if shown.is_empty() {
        println!("No models are available. Check CUSTOM_MODELS and the server policy.");
        return Ok(());
    }

    for model in &shown {
        println!("{}", format_model_line(model));
        if let Some(description) = &model.description {
            println!("    {description}");
        }
    }

    println!();
    println!("* = default model");
    Ok(())
}

pub async fn list_remote_models(ctx: ApiContext, provider: Option<String>) -> Result<(), Box<dyn Error>> {
    let provider_id = provider.unwrap_or_else(|| "openai".to_string());
    let client = ClientApi::for_provider_id(&provider_id, ctx)
        .ok_or_else(|| format!("Unknown provider '{provider_id}'. Run 'llmux providers' to list them."))?;

    let models = client.llm().list_models().await?;

    println!("🤖 Models reported by {provider_id}");
    println!("{RULE}");
    println!();

    if models.is_empty() {
        println!("No models found for this provider.");
        return Ok(());
    }

    println!("Found {} models (sorted newest first):", models.len());
    println!();
    for model in &models {
        if model.display_name != model.name {
            println!("  • {} ({})", model.name, model.display_name);
        } else {
            println!("  • {}", model.name);
        }
    }
    Ok(())
}
