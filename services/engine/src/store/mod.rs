//! Persistence layer for the engine.
//!
//! This module provides:
//! - The [`DocumentStore`] trait, a JSON document store keyed by
//!   `(collection, id)`
//! - The typed [`Store`] facade used by every component
//! - An in-memory backend ([`MemoryStore`]) and a Postgres backend
//!   ([`PgDocumentStore`])
//!
//! Saves are atomic per document. Conflict and validation failures are
//! reported distinctly from transport failures so callers can tell a bad write
//! from an unreachable store.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{DbConfig, PgDocumentStore};

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write collided with another write (e.g. a unique key).
    #[error("conflict on {collection}/{id}: {message}")]
    Conflict {
        collection: String,
        id: String,
        message: String,
    },

    /// The document was rejected by the store's constraints.
    #[error("validation failed for {collection}/{id}: {message}")]
    Validation {
        collection: String,
        id: String,
        message: String,
    },

    /// The store could not be reached or the operation failed in transit.
    #[error("store unavailable: {0}")]
    Transport(String),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}")]
    MigrationDirNotFound { tried: String, last_error: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for failures caused by the document itself rather than
    /// the store's availability.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Validation { .. })
    }

    /// Returns true if the store could not be reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// An entity that can be stored as a document.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Collection the entity lives in.
    const COLLECTION: &'static str;

    /// Identifier within the collection.
    fn key(&self) -> String;
}

/// Raw document storage backend.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Value>>;

    /// Fetch every document in a collection, ordered by id.
    async fn scan(&self, collection: &str) -> StoreResult<Vec<Value>>;

    /// Insert or replace one document atomically.
    async fn put(&self, collection: &str, id: &str, body: Value) -> StoreResult<()>;

    /// Delete one document. Returns false if it did not exist.
    async fn remove(&self, collection: &str, id: &str) -> StoreResult<bool>;
}

/// Typed handle over a [`DocumentStore`]. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn DocumentStore>,
}

impl Store {
    /// Wrap a backend.
    pub fn new(backend: impl DocumentStore + 'static) -> Self {
        Self {
            inner: Arc::new(backend),
        }
    }

    /// Wrap a shared backend.
    pub fn from_arc(backend: Arc<dyn DocumentStore>) -> Self {
        Self { inner: backend }
    }

    /// Find a document by identifier.
    pub async fn find<T: Document>(&self, id: &impl Display) -> StoreResult<Option<T>> {
        match self.inner.get(T::COLLECTION, &id.to_string()).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    /// Every document of a kind, ordered by id.
    pub async fn list<T: Document>(&self) -> StoreResult<Vec<T>> {
        self.inner
            .scan(T::COLLECTION)
            .await?
            .into_iter()
            .map(|body| serde_json::from_value(body).map_err(StoreError::from))
            .collect()
    }

    /// Documents of a kind matching `predicate`, ordered by id.
    pub async fn filter<T, F>(&self, predicate: F) -> StoreResult<Vec<T>>
    where
        T: Document,
        F: Fn(&T) -> bool + Send,
    {
        let all: Vec<T> = self.list().await?;
        Ok(all.into_iter().filter(|doc| predicate(doc)).collect())
    }

    /// Insert or replace a document.
    pub async fn save<T: Document>(&self, doc: &T) -> StoreResult<()> {
        let body = serde_json::to_value(doc)?;
        self.inner.put(T::COLLECTION, &doc.key(), body).await
    }

    /// Delete a document by identifier.
    pub async fn delete<T: Document>(&self, id: &impl Display) -> StoreResult<bool> {
        self.inner.remove(T::COLLECTION, &id.to_string()).await
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
