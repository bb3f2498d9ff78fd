use super::*;
use crate::core::access::AccessPolicy;
use crate::core::model_table::ProviderRef;
use std::sync::Arc;

fn parse_args(argv: &[&str]) -> Args {
    Args::try_parse_from(argv)
        .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
}

fn table() -> Vec<ModelDescriptor> {
    let openai = Arc::new(ProviderRef::new("openai", "OpenAI", "openai"));
    let azure = Arc::new(ProviderRef::new("azure", "Azure", "azure"));
    let mut disabled = ModelDescriptor::new("gpt-4", Some(openai.clone()));
    disabled.available = false;
    vec![
        ModelDescriptor::new("gpt-4o", Some(openai.clone())),
        ModelDescriptor::new("gpt-4o", Some(azure)),
        disabled,
        ModelDescriptor::new("gpt-4o-mini", Some(openai)),
    ]
}

#[test]
fn say_collects_trailing_prompt_words() {
    let argv = ["llmux", "say", "-m", "gpt-4o@azure", "--no-stream", "hello", "there"];
    match parse_args(&argv).command {
        Commands::Say {
            model,
            no_stream,
            prompt,
        } => {
            assert_eq!(model.as_deref(), Some("gpt-4o@azure"));
            assert!(no_stream);
            assert_eq!(prompt, vec!["hello", "there"]);
        }
        _ => panic!("expected say subcommand for argv={argv:?}"),
    }
}

#[test]
fn say_requires_a_prompt() {
    assert!(Args::try_parse_from(["llmux", "say"]).is_err());
}

#[test]
fn global_flags_parse_after_subcommand() {
    let argv = ["llmux", "models", "--all", "--config", "/tmp/llmux.toml", "--log", "/tmp/llmux.log"];
    let args = parse_args(&argv);
    assert!(matches!(args.command, Commands::Models { all: true }));
    assert_eq!(args.config, Some(PathBuf::from("/tmp/llmux.toml")));
    assert_eq!(args.log, Some(PathBuf::from("/tmp/llmux.log")));
}

#[test]
fn speak_has_voice_and_model_defaults() {
    let argv = ["llmux", "speak", "good", "morning", "-o", "out.mp3"];
    match parse_args(&argv).command {
        Commands::Speak {
            text,
            output,
            voice,
            model,
        } => {
            assert_eq!(text.join(" "), "good morning");
            assert_eq!(output, PathBuf::from("out.mp3"));
            assert_eq!(voice, "alloy");
            assert_eq!(model, "tts-1");
        }
        _ => panic!("expected speak subcommand for argv={argv:?}"),
    }
}

#[test]
fn resolve_model_honours_explicit_provider() {
    let models = table();
    let model = resolve_model(&models, Some("gpt-4o@azure"), "").unwrap();
    assert_eq!(model.key(), "gpt-4o@azure");

    let model = resolve_model(&models, Some("gpt-4o"), "").unwrap();
    assert_eq!(model.key(), "gpt-4o@openai");
}

#[test]
fn resolve_model_rejects_disabled_bare_names() {
    let models = table();
    assert!(resolve_model(&models, Some("gpt-4"), "").is_err());
    assert!(resolve_model(&models, Some("nope"), "").is_err());
}

#[test]
fn resolve_model_prefers_table_default_then_configured_model() {
    let mut models = table();
    let model = resolve_model(&models, None, "gpt-4o-mini").unwrap();
    assert_eq!(model.key(), "gpt-4o-mini@openai");

    models[1].is_default = true;
    let model = resolve_model(&models, None, "gpt-4o-mini").unwrap();
    assert_eq!(model.key(), "gpt-4o@azure");

    models[1].is_default = false;
    let model = resolve_model(&models, Some("  "), "unknown").unwrap();
    assert_eq!(model.key(), "gpt-4o@openai");
}

#[test]
fn api_context_carries_config_snapshot() {
    let mut config = Config::default();
    config.request_timeout_ms = 1500;
    config.access = AccessPolicy {
        openai_api_key: "sk-config".to_string(),
        ..Default::default()
    };
    let ctx = api_context(&config);
    assert_eq!(ctx.request_timeout, std::time::Duration::from_millis(1500));
    assert_eq!(ctx.access.openai_api_key, "sk-config");
    assert!(ctx.resolved_models().iter().any(|m| m.key() == "gpt-4o@openai"));
}
