use std::error::Error;
use std::fmt;

/// Shown instead of the raw server body when a provider answers 401.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized: the access code is missing or incorrect, or no valid API key is configured.\n\nEnter the access code in settings, or provide your own API key for this provider.";

/// Failures surfaced by the chat orchestrator and the provider clients.
///
/// `Config` errors are returned synchronously before anything is sent. All
/// other variants travel over the chat event channel for streaming requests.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatError {
    Config(String),
    Transport(String),
    Timeout,
    Protocol { status: u16, body: String },
    Unauthorized,
    EmptyResponse,
    Decode(String),
}

impl ChatError {
    pub fn config(message: impl Into<String>) -> Self {
        ChatError::Config(message.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, ChatError::Config(_))
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Config(message) => write!(f, "configuration error: {message}"),
            ChatError::Transport(message) => write!(f, "request failed: {message}"),
            ChatError::Timeout => write!(f, "request timed out"),
            ChatError::Protocol { status, body } => {
                write!(f, "unexpected response (status {status}): {body}")
            }
            ChatError::Unauthorized => write!(f, "{UNAUTHORIZED_MESSAGE}"),
            ChatError::EmptyResponse => write!(f, "empty response from server"),
            ChatError::Decode(message) => write!(f, "failed to decode response: {message}"),
        }
    }
}

impl Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout
        } else if err.is_decode() {
            ChatError::Decode(err.to_string())
        } else {
            ChatError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Decode(err.to_string())
    }
}
