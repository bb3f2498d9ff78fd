//! llmux is a multi-provider LLM chat client core.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns model table resolution (built-in catalogue, server and
//!   local directives, custom providers), credential policy, request shaping,
//!   and the streaming chat orchestrator.
//! - [`api`] defines the OpenAI-compatible wire payloads.
//! - [`cli`] exposes the `llmux` command surface.
//! - [`utils`] holds URL and logging helpers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
