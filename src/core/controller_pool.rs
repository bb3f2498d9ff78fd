//! Registry of in-flight requests, keyed by session and message, so a single
//! answer or every answer can be stopped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Token plus the generation handed out when it was tracked.
type Entry = (u64, CancellationToken);
type Registry = HashMap<String, HashMap<String, Entry>>;

#[derive(Clone, Default)]
pub struct ControllerPool {
    inner: Arc<Mutex<Registry>>,
    generations: Arc<AtomicU64>,
}

impl ControllerPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Entries are plain tokens, so a poisoned map is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a request and returns its generation. A previous token under
    /// the same key is cancelled.
    pub fn track(&self, session_id: &str, message_id: &str, token: CancellationToken) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        debug!(session_id, message_id, generation, "tracking request");
        let previous = self
            .registry()
            .entry(session_id.to_string())
            .or_default()
            .insert(message_id.to_string(), (generation, token));
        if let Some((_, previous)) = previous {
            previous.cancel();
        }
        generation
    }

    /// Cancels and forgets one request. Returns whether it was tracked.
    pub fn stop(&self, session_id: &str, message_id: &str) -> bool {
        match self.take(session_id, message_id, None) {
            Some(token) => {
                debug!(session_id, message_id, "stopping request");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let drained: Vec<CancellationToken> = self
            .registry()
            .drain()
            .flat_map(|(_, messages)| messages.into_values().map(|(_, token)| token))
            .collect();
        debug!(count = drained.len(), "stopping all requests");
        for token in drained {
            token.cancel();
        }
    }

    pub fn has_pending(&self) -> bool {
        self.registry().values().any(|messages| !messages.is_empty())
    }

    pub fn pending_count(&self) -> usize {
        self.registry().values().map(HashMap::len).sum()
    }

    /// Forgets a request that reached a terminal state without cancelling it.
    /// A newer request tracked under the same key is left alone.
    pub fn remove_if(&self, session_id: &str, message_id: &str, generation: u64) -> bool {
        self.take(session_id, message_id, Some(generation)).is_some()
    }

    fn take(
        &self,
        session_id: &str,
        message_id: &str,
        generation: Option<u64>,
    ) -> Option<CancellationToken> {
        let mut registry = self.registry();
        let messages = registry.get_mut(session_id)?;
        let (tracked, _) = messages.get(message_id)?;
        if generation.is_some_and(|wanted| wanted != *tracked) {
            return None;
        }
        let token = messages.remove(message_id).map(|(_, token)| token);
        if messages.is_empty() {
            registry.remove(session_id);
        }
        token
    }
}
