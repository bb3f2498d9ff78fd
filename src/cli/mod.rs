//! Command-line interface parsing and handling
//!
//! Each subcommand loads the configuration once, builds an [`ApiContext`]
//! snapshot from it, and hands that to the command handler.

pub mod model_list;
pub mod provider_list;
pub mod say;
pub mod speak;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::cli::model_list::{list_models, list_remote_models};
use crate::cli::provider_list::{list_providers, show_usage};
use crate::cli::say::run_say;
use crate::cli::speak::run_speak;
use crate::core::config::Config;
use crate::core::custom_providers::find_selection;
use crate::core::model_table::ModelDescriptor;
use crate::core::platform::ApiContext;
use crate::utils::logging::init_logging;

#[derive(Parser)]
#[command(name = "llmux")]
#[command(about = "Multi-provider LLM chat client")]
#[command(
    long_about = "llmux resolves a model table from built-in providers, server policy and local \
directives, then streams chat answers from any OpenAI-compatible provider.\n\n\
Environment Variables (override the config file):\n\
  OPENAI_API_KEY, OPENAI_BASE_URL, AZURE_URL, AZURE_API_KEY, AZURE_API_VERSION,\n\
  GOOGLE_API_KEY, ANTHROPIC_API_KEY, DEEPSEEK_API_KEY, ACCESS_CODE,\n\
  CUSTOM_MODELS, DEFAULT_MODEL\n\n\
Logging:\n\
  LLMUX_LOG (or RUST_LOG) sets the log filter, e.g. LLMUX_LOG=llmux=debug"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Read settings from this file instead of the platform config path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Append diagnostic logs to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the resolved model table
    Models {
        /// Include models disabled by directives
        #[arg(long)]
        all: bool,
    },
    /// Send one prompt and print the answer
    Say {
        /// Model to use, as `name` or `name@provider`
        #[arg(short = 'm', long)]
        model: Option<String>,
        /// Wait for the whole answer instead of streaming
        #[arg(long)]
        no_stream: bool,
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
    },
    /// List models reported by a provider's API
    RemoteModels {
        /// Provider id (built-in or custom); defaults to openai
        #[arg(short = 'p', long)]
        provider: Option<String>,
    },
    /// Synthesize speech to an audio file
    Speak {
        #[arg(required = true)]
        text: Vec<String>,
        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,
        #[arg(long, default_value = "alloy")]
        voice: String,
        #[arg(long, default_value = "tts-1")]
        model: String,
    },
    /// Show billing usage for the OpenAI account
    Usage,
    /// List providers and custom endpoints
    Providers,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log.as_deref())?;
    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(args.config.as_deref())?;
    let ctx = api_context(&config);

    match args.command {
        Commands::Models { all } => list_models(&ctx, all),
        Commands::Say {
            model,
            no_stream,
            prompt,
        } => run_say(&config, ctx, prompt, model, no_stream).await,
        Commands::RemoteModels { provider } => list_remote_models(ctx, provider).await,
        Commands::Speak {
            text,
            output,
            voice,
            model,
        } => run_speak(ctx, text, &output, voice, model).await,
        Commands::Usage => show_usage(ctx).await,
        Commands::Providers => list_providers(&ctx),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn Error>> {
    Ok(Config::load(path)?)
}

pub fn api_context(config: &Config) -> ApiContext {
    ApiContext::new(
        reqwest::Client::new(),
        config.access.clone(),
        config.custom_providers.clone(),
    )
    .with_request_timeout(config.request_timeout())
}

/// Finds the model a selection refers to. Without a selection: the table's
/// default, then the configured model, then the first available entry.
pub fn resolve_model(
    models: &[ModelDescriptor],
    selection: Option<&str>,
    configured: &str,
) -> Result<ModelDescriptor, Box<dyn Error>> {
    let found = match selection.map(str::trim).filter(|s| !s.is_empty()) {
        Some(selection) => find_selection(models, selection),
        None => models
            .iter()
            .find(|model| model.is_default)
            .or_else(|| find_selection(models, configured))
            .or_else(|| models.iter().find(|model| model.available)),
    };
    match found {
        Some(model) => Ok(model.clone()),
        None => Err(format!(
            "Unknown or unavailable model '{}'. Run 'llmux models' to see the model table.",
            selection.unwrap_or(configured)
        )
        .into()),
    }
}

#[cfg(test)]
mod tests;
