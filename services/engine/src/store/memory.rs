//! In-memory document store.
//!
//! Used for tests and for dev mode when no database is configured. Keeps a
//! per-collection write counter and can be told to fail writes, which lets
//! tests observe exactly how often a component persists.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{DocumentStore, StoreError, StoreResult};

#[derive(Default)]
struct Collections {
    docs: HashMap<String, BTreeMap<String, Value>>,
    writes: HashMap<String, usize>,
}

/// Document store held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<Collections>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a transport error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail with a transport error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Successful writes (puts and removes) made to `collection`.
    pub async fn writes(&self, collection: &str) -> usize {
        self.state
            .read()
            .await
            .writes
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    fn check_reads(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("memory store: reads disabled".into()));
        }
        Ok(())
    }

    fn check_writes(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("memory store: writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        self.check_reads()?;
        let state = self.state.read().await;
        Ok(state
            .docs
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn scan(&self, collection: &str) -> StoreResult<Vec<Value>> {
        self.check_reads()?;
        let state = self.state.read().await;
        Ok(state
            .docs
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> StoreResult<()> {
        self.check_writes()?;
        if !body.is_object() {
            return Err(StoreError::Validation {
                collection: collection.to_string(),
                id: id.to_string(),
                message: "document body must be a JSON object".to_string(),
            });
        }

        let mut state = self.state.write().await;
        state
            .docs
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), body);
        *state.writes.entry(collection.to_string()).or_default() += 1;
        debug!(collection, id, "Saved document");
        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.check_writes()?;
        let mut state = self.state.write().await;
        let removed = state
            .docs
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            *state.writes.entry(collection.to_string()).or_default() += 1;
        }
        Ok(removed)
    }
}
