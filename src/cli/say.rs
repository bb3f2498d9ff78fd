//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::cli::resolve_model;
use crate::core::chat_stream::ChatEvent;
use crate::core::config::Config;
use crate::core::error::ChatError;
use crate::core::message::RequestMessage;
use crate::core::params::{CallConfig, LlmConfig};
use crate::core::platform::{ApiContext, ChatOptions, ClientApi};

const SESSION_ID: &str = "cli";
const MESSAGE_ID: &str = "say";

pub async fn run_say(
    config: &Config,
    ctx: ApiContext,
    prompt: Vec<String>,
    model: Option<String>,
    no_stream: bool,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err("Usage: llmux say <prompt>".into());
    }

    let descriptor = resolve_model(&ctx.resolved_models(), model.as_deref(), &config.model.model)?;
    let llm_config = LlmConfig::merged(
        &config.model,
        None,
        CallConfig {
            model: Some(descriptor.name.clone()),
            provider_name: descriptor.provider_id().map(str::to_string),
            stream: no_stream.then_some(false),
        },
    );

    let pool = ctx.pool.clone();
    let client = ClientApi::for_model(&descriptor, ctx);
    let mut handle = client
        .llm()
        .chat(ChatOptions::new(
            SESSION_ID,
            MESSAGE_ID,
            vec![RequestMessage::user(prompt)],
            llm_config,
        ))
        .await?;

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            pool.stop_all();
        }
    });

    let mut stdout = io::stdout();
    let mut failed = false;
    while let Some(event) = handle.events.recv().await {
        match event {
            ChatEvent::Update { chunk, .. } => {
                write!(stdout, "{chunk}")?;
                stdout.flush()?;
            }
            ChatEvent::Error(ChatError::EmptyResponse) => {
                eprintln!("⚠️  The model returned an empty answer.");
            }
            ChatEvent::Error(err) => {
                eprintln!("❌ {err}");
                failed = true;
            }
            ChatEvent::Finish { .. } => writeln!(stdout)?,
        }
    }
    interrupt.abort();

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
