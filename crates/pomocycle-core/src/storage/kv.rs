//! Flat key-value persistence for timer state.
//!
//! The clock saves a handful of scalar fields under fixed key names so a
//! fresh process can rebuild it exactly. Any store that maps strings to
//! strings will do: the SQLite `kv` table in production, a `HashMap` in
//! tests.

use std::collections::HashMap;

use crate::error::Result;

/// Fixed key names. These are shared with previously saved state, so they
/// must not change.
pub mod keys {
    pub const IS_PAUSED: &str = "isPaused";
    pub const START_TIME: &str = "startTime";
    pub const PAUSE_START: &str = "pauseStart";
    pub const PAUSE_OFFSET: &str = "pauseOffset";
    pub const TIME_AMOUNTS: &str = "timeAmounts";
    pub const ORDER: &str = "order";
    pub const POMO_COUNT: &str = "pomoCount";
    pub const SAVE_TIME: &str = "saveTime";
}

pub trait KeyValueStore {
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
