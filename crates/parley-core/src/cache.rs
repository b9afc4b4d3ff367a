//! Per-session memo of reasoning replies.

use std::collections::HashMap;

/// Replies keyed by `(prompt, history length)`. Unbounded; cleared on reset.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<(String, usize), String>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prompt: &str, history_len: usize) -> Option<&str> {
        self.entries
            .get(&(prompt.to_string(), history_len))
            .map(String::as_str)
    }

    pub fn insert(&mut self, prompt: &str, history_len: usize, reply: impl Into<String>) {
        self.entries
            .insert((prompt.to_string(), history_len), reply.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
