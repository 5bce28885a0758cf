//! # Discovery Store Interface
//!
//! The collaborator seam between the watcher and whatever key-value registry
//! backs service discovery (ZooKeeper, etcd, an in-memory map for tests).
//! The store only needs two primitives: listing the children of a service's
//! registration path and a long-lived change feed over that path. A missing
//! path is distinguishable from other failures because the watcher treats it
//! as "service not registered yet" rather than an error worth logging at
//! error level.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::error::BalanceError;

/// One registered entry under a service path: a URL-encoded endpoint address
/// as the key and opaque `key=value&key=value` metadata as the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: String,
}

impl KvPair {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Errors from a discovery store backend
#[derive(Debug, Error, Clone)]
pub enum DiscoveryError {
    /// The listed path does not exist (service has no registered endpoints)
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    /// Any other backend failure; treated as transient by the watcher
    #[error("discovery store error: {message}")]
    Store { message: String },
}

impl DiscoveryError {
    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }
}

impl From<DiscoveryError> for BalanceError {
    fn from(err: DiscoveryError) -> Self {
        BalanceError::discovery(err.to_string())
    }
}

/// Change feed delivering the full current child set after every mutation
pub type WatchFeed = mpsc::UnboundedReceiver<Vec<KvPair>>;

/// Abstract discovery registry client.
///
/// Implementations must be cheap to share (`Arc<dyn DiscoveryStore>`); the
/// watcher holds one for the lifetime of its session.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// List the current children registered under `prefix`.
    ///
    /// Returns `DiscoveryError::KeyNotFound` when the path itself is absent.
    async fn list(&self, prefix: &str) -> Result<Vec<KvPair>, DiscoveryError>;

    /// Open a change feed over `prefix`.
    ///
    /// Every mutation under the path delivers the complete current child set
    /// as one batch; the first batch reflects the state at subscription time.
    /// The feed ends when `stop` is cancelled or the backend connection is
    /// lost, after which the watcher re-lists and re-subscribes.
    async fn watch_tree(
        &self,
        prefix: &str,
        stop: CancellationToken,
    ) -> Result<WatchFeed, DiscoveryError>;
}
