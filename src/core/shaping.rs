//! Provider-specific message shaping ahead of dispatch.

use tracing::debug;

use crate::core::images::{preprocess_image_content, ImageResolver};
use crate::core::message::{message_text_without_thinking, MessageContent, RequestMessage, Role};
use crate::core::model_family::ModelCapabilities;

/// Content of the assistant turn inserted between two user turns.
pub const ALTERNATION_FILLER: &str = ";";

/// Normalizes content for the target model and drops system prompts the
/// model family rejects. Alternation repair runs when the family needs it.
pub async fn shape_messages(
    messages: &[RequestMessage],
    caps: &ModelCapabilities,
    images: &dyn ImageResolver,
) -> Vec<RequestMessage> {
    let mut shaped = Vec::with_capacity(messages.len());
    for message in messages {
        if caps.forbids_system && message.role == Role::System {
            debug!("dropping system message for model family without system support");
            continue;
        }
        let content = if caps.vision {
            match (&message.content, message.role) {
                (MessageContent::Text(_), Role::Assistant) => {
                    MessageContent::Text(message_text_without_thinking(message))
                }
                _ => preprocess_image_content(message.content.clone(), images).await,
            }
        } else {
            MessageContent::Text(message_text_without_thinking(message))
        };
        shaped.push(RequestMessage {
            role: message.role,
            content,
        });
    }

    if caps.requires_alternation {
        repair_alternation(shaped)
    } else {
        shaped
    }
}

/// Enforces strict user/assistant turn-taking.
///
/// Leading assistant turns are dropped, and anything between an opening
/// system prompt and the first user turn. Two user turns get a filler
/// assistant turn between them; of two same-role non-user turns only the
/// later survives. Trailing non-user turns are removed.
pub fn repair_alternation(mut messages: Vec<RequestMessage>) -> Vec<RequestMessage> {
    let leading = messages
        .iter()
        .take_while(|m| !matches!(m.role, Role::System | Role::User))
        .count();
    if leading > 0 {
        debug!(dropped = leading, "dropping leading non-user messages");
        messages.drain(..leading);
    }

    if messages.first().is_some_and(|m| m.role == Role::System) {
        let skipped = messages[1..]
            .iter()
            .take_while(|m| m.role != Role::User)
            .count();
        if skipped > 0 {
            debug!(dropped = skipped, "dropping messages between system prompt and first user turn");
            messages.drain(1..1 + skipped);
        }
    }

    let mut i = 0;
    while i + 1 < messages.len() {
        let (current, next) = (messages[i].role, messages[i + 1].role);
        if current != next {
            i += 1;
        } else if current == Role::User {
            messages.insert(i + 1, RequestMessage::assistant(ALTERNATION_FILLER));
            i += 2;
        } else {
            messages.remove(i);
        }
    }

    while messages.last().is_some_and(|m| m.role != Role::User) {
        messages.pop();
    }

    messages
}
