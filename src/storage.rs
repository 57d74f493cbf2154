//! # Storage Engine Contract
//!
//! The repository core is agnostic to persistence technology: the insert and
//! delete handles depend only on the [`Storage`] trait defined here. The
//! contract is keyed by hierarchical name and supports selector-based lookup,
//! not just exact keys, because the repository's retrieval surface exposes
//! prefix queries to external readers (names may carry repository-generated
//! uniquifying suffixes).
//!
//! [`MemoryStore`] is the reference engine backing the tests. It keeps
//! records in a `BTreeMap` ordered by name components, so a prefix query is
//! one contiguous range scan.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::name::Name;

/// The persisted form of a content object. Signature verification happens
/// before persistence, so the record does not retain it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageRecord {
    pub name: Name,
    pub payload: Vec<u8>,
}

/// Failures are fatal to the single operation in progress, never to the
/// engine: the calling handle aborts its command and other commands proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage I/O failure: {0}")]
    IoFailure(String),
    #[error("stored record corrupt: {0}")]
    Corrupt(String),
}

/// Disambiguation rule for [`Storage::lookup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    /// The record stored under exactly this name.
    Exact,
    /// Among records whose names extend the queried prefix, the one with the
    /// most components (deepest match); ties resolve to the first in name
    /// order. Matches names carrying a uniquifying suffix under the prefix.
    LongestUnderPrefix,
}

/// Content-addressed durable store keyed by hierarchical name.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Upserts; overwrites an existing record for the same exact name.
    async fn put(&self, name: Name, payload: Vec<u8>) -> Result<(), StorageError>;

    async fn lookup(
        &self,
        name: &Name,
        selector: Selector,
    ) -> Result<Option<StorageRecord>, StorageError>;

    /// Returns whether a record existed. Absence is not an error.
    async fn remove(&self, name: &Name) -> Result<bool, StorageError>;
}

#[async_trait]
impl<S: Storage> Storage for Arc<S> {
    async fn put(&self, name: Name, payload: Vec<u8>) -> Result<(), StorageError> {
        (**self).put(name, payload).await
    }

    async fn lookup(
        &self,
        name: &Name,
        selector: Selector,
    ) -> Result<Option<StorageRecord>, StorageError> {
        (**self).lookup(name, selector).await
    }

    async fn remove(&self, name: &Name) -> Result<bool, StorageError> {
        (**self).remove(name).await
    }
}

/// In-memory reference implementation of the storage contract.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Name, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn put(&self, name: Name, payload: Vec<u8>) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        let replaced = records.insert(name.clone(), payload).is_some();
        debug!(name = %name, replaced = replaced, "stored record");
        Ok(())
    }

    async fn lookup(
        &self,
        name: &Name,
        selector: Selector,
    ) -> Result<Option<StorageRecord>, StorageError> {
        let records = self.records.read().await;
        match selector {
            Selector::Exact => Ok(records.get(name).map(|payload| StorageRecord {
                name: name.clone(),
                payload: payload.clone(),
            })),
            Selector::LongestUnderPrefix => {
                // Names extending `name` form a contiguous block in component
                // order starting at `name` itself.
                let mut best: Option<(&Name, &Vec<u8>)> = None;
                for (candidate, payload) in records.range(name.clone()..) {
                    if !name.is_prefix_of(candidate) {
                        break;
                    }
                    match best {
                        Some((current, _)) if candidate.len() <= current.len() => {}
                        _ => best = Some((candidate, payload)),
                    }
                }
                Ok(best.map(|(name, payload)| StorageRecord {
                    name: name.clone(),
                    payload: payload.clone(),
                }))
            }
        }
    }

    async fn remove(&self, name: &Name) -> Result<bool, StorageError> {
        let existed = self.records.write().await.remove(name).is_some();
        debug!(name = %name, existed = existed, "removed record");
        Ok(existed)
    }
}
