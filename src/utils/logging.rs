//! Diagnostic logging setup for the binary.

use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "LLMUX_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Filter from `LLMUX_LOG`, then `RUST_LOG`, then `warn`.
pub fn env_filter_from<F>(lookup: F) -> EnvFilter
where
    F: Fn(&str) -> Option<String>,
{
    let directives = lookup(LOG_ENV_VAR)
        .or_else(|| lookup(EnvFilter::DEFAULT_ENV))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());
    EnvFilter::try_new(&directives).unwrap_or_else(|err| {
        eprintln!("Ignoring invalid log filter {directives:?}: {err}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}

/// Installs the global subscriber. Logs go to stderr, or are appended to
/// `log_file` when given, so stdout carries only answers.
pub fn init_logging(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let filter = env_filter_from(|name| std::env::var(name).ok());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| err as Box<dyn Error>)?;
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| err as Box<dyn Error>)?,
    }
    Ok(())
}
