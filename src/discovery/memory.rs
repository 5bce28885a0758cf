//! # In-Memory Discovery Store
//!
//! A [`DiscoveryStore`] backed by a process-local map, for tests and simple
//! static deployments. Mutations fan the full child set out to every live
//! watch feed, matching the tree-watch semantics of the real registries.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::discovery::store::{DiscoveryError, DiscoveryStore, KvPair, WatchFeed};

struct Watch {
    prefix: String,
    sender: mpsc::UnboundedSender<Vec<KvPair>>,
    stop: CancellationToken,
}

/// Process-local registry. Keys are full paths (`prefix/child`); `list` and
/// the watch feeds return child keys relative to the prefix, the way a tree
/// store exposes a directory's children.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    watches: Mutex<Vec<Watch>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update an entry and notify watchers of the affected prefix
    pub fn put<K: Into<String>, V: Into<String>>(&self, key: K, value: V) {
        let key = key.into();
        debug!(key = %key, "memory store put");
        self.entries.write().insert(key, value.into());
        self.notify();
    }

    /// Remove an entry and notify watchers
    pub fn delete(&self, key: &str) {
        debug!(key, "memory store delete");
        self.entries.write().remove(key);
        self.notify();
    }

    /// Drop every live watch feed, simulating a lost backend connection.
    ///
    /// Subscribers observe their feed ending and recover by re-listing;
    /// later mutations reach only feeds opened after the cut.
    pub fn sever_watches(&self) {
        let mut watches = self.watches.lock();
        debug!(count = watches.len(), "severing watch feeds");
        watches.clear();
    }

    fn children(&self, prefix: &str) -> Vec<KvPair> {
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        self.entries
            .read()
            .range(dir.clone()..)
            .take_while(|(k, _)| k.starts_with(&dir))
            .map(|(k, v)| KvPair::new(&k[dir.len()..], v.clone()))
            .collect()
    }

    fn notify(&self) {
        let mut watches = self.watches.lock();
        watches.retain(|watch| {
            if watch.stop.is_cancelled() {
                return false;
            }
            let batch = self.children(&watch.prefix);
            watch.sender.send(batch).is_ok()
        });
    }
}

#[async_trait]
impl DiscoveryStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<KvPair>, DiscoveryError> {
        let children = self.children(prefix);
        if children.is_empty() {
            return Err(DiscoveryError::not_found(prefix));
        }
        Ok(children)
    }

    async fn watch_tree(
        &self,
        prefix: &str,
        stop: CancellationToken,
    ) -> Result<WatchFeed, DiscoveryError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        // initial batch reflects the state at subscription time
        let _ = sender.send(self.children(prefix));
        self.watches.lock().push(Watch {
            prefix: prefix.to_string(),
            sender,
            stop,
        });
        Ok(receiver)
    }
}
