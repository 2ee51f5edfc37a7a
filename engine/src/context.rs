//! Session context store
//!
//! Append-only typed store shared by every step of every plan in a session.
//! Entries are addressed by (context_type, context_key); keys are unique across
//! the whole session regardless of type, and nothing is ever overwritten or
//! removed. Insertion order is preserved so summaries read chronologically.

use sdk::context::{ContextEntry, ContextSummary};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};


#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStore {
    entries: Vec<ContextEntry>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an entry
    ///
    /// Fails with `DuplicateKey` when the key is already taken, whatever its
    /// type; the existing entry is left untouched.
    pub fn put(&mut self, entry: ContextEntry) -> Result<(), EngineError> {
        if let Some(existing) = self.entries.iter().find(|e| e.key == entry.key) {
            return Err(EngineError::DuplicateKey {
                context_type: existing.context_type.clone(),
                key: entry.key,
            });
        }

        tracing::debug!(
            context_type = %entry.context_type,
            key = %entry.key,
            "Context entry written"
        );
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, context_type: &str, key: &str) -> Result<&ContextEntry, EngineError> {
        self.entries
            .iter()
            .find(|e| e.context_type == context_type && e.key == key)
            .ok_or_else(|| EngineError::NotFound {
                context_type: context_type.to_string(),
                key: key.to_string(),
            })
    }

    pub fn contains(&self, context_type: &str, key: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.context_type == context_type && e.key == key)
    }

    /// Whether the key is taken under any type
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.context_type.as_str(), e.key.as_str()))
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Human-oriented view of every entry, in insertion order
    pub fn summaries(&self) -> Vec<ContextSummary> {
        self.entries.iter().map(ContextEntry::to_summary).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ContextEntry> {
        self.entries.clone()
    }

    /// Rebuild a store from a snapshot, re-checking key uniqueness
    pub fn restore(snapshot: Vec<ContextEntry>) -> Result<Self, EngineError> {
        let mut store = Self::new();
        for entry in snapshot {
            store.put(entry)?;
        }
        Ok(store)
    }
}
