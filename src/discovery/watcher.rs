//! # Discovery Watcher
//!
//! The long-lived loop keeping one balancer session's endpoint table
//! synchronized with the registry. The watcher moves between two states:
//! listing (fetch the full child set of the service path) and watching
//! (consume full-set batches from the change feed). Both states diff the
//! full set against the retained snapshot into add/modify/delete deltas, so
//! a re-list after an outage also removes whatever deregistered while the
//! feed was down. Every transient failure logs, sleeps a fixed backoff, and
//! goes back to listing; the only way the loop ends is its stop token,
//! which the owning session cancels on close. It never stops updating
//! silently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::balancing::BalanceSession;
use crate::core::types::EndpointUpdate;
use crate::discovery::store::{DiscoveryStore, KvPair};

/// Watches one service's registration path and drives the session's
/// endpoint table with the resulting deltas.
pub struct Watcher {
    store: Arc<dyn DiscoveryStore>,
    session: Arc<BalanceSession>,
    prefix: String,
    backoff: Duration,
    snapshot: HashMap<String, String>,
}

impl Watcher {
    /// Create a watcher over `prefix` feeding `session`.
    ///
    /// `backoff` is the fixed delay between retries after any listing or
    /// watching failure.
    pub fn new(
        store: Arc<dyn DiscoveryStore>,
        session: Arc<BalanceSession>,
        prefix: impl Into<String>,
        backoff: Duration,
    ) -> Self {
        Self {
            store,
            session,
            prefix: prefix.into(),
            backoff,
            snapshot: HashMap::new(),
        }
    }

    /// Run the watcher on a background task. The task ends when the
    /// session's stop token is cancelled.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// The watcher loop. Exposed for callers that want to drive it on a
    /// runtime of their own choosing instead of `spawn`.
    pub async fn run(mut self) {
        let stop = self.session.stop_token();
        info!(prefix = %self.prefix, "discovery watcher starting");
        'listing: loop {
            if stop.is_cancelled() {
                break;
            }
            let pairs = match self.store.list(&self.prefix).await {
                Ok(pairs) => pairs,
                Err(err) if err.is_not_found() => {
                    warn!(prefix = %self.prefix, "service path not registered yet, retrying");
                    if !self.backoff_or_stop(&stop).await {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    error!(prefix = %self.prefix, error = %err, "listing service path failed");
                    if !self.backoff_or_stop(&stop).await {
                        break;
                    }
                    continue;
                }
            };
            let updates = diff_snapshot(&mut self.snapshot, pairs);
            self.deliver(updates);

            let mut feed = match self
                .store
                .watch_tree(&self.prefix, stop.child_token())
                .await
            {
                Ok(feed) => feed,
                Err(err) => {
                    error!(prefix = %self.prefix, error = %err, "opening watch feed failed");
                    if !self.backoff_or_stop(&stop).await {
                        break;
                    }
                    continue;
                }
            };
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break 'listing,
                    batch = feed.recv() => match batch {
                        Some(pairs) => {
                            let updates = diff_snapshot(&mut self.snapshot, pairs);
                            self.deliver(updates);
                        }
                        None => {
                            // feed closed by the backend; re-list against the
                            // retained snapshot after the usual backoff
                            warn!(prefix = %self.prefix, "watch feed closed, re-listing");
                            if !self.backoff_or_stop(&stop).await {
                                break 'listing;
                            }
                            continue 'listing;
                        }
                    }
                }
            }
        }
        info!(prefix = %self.prefix, "discovery watcher stopped");
    }

    fn deliver(&self, updates: Vec<EndpointUpdate>) {
        if updates.is_empty() {
            return;
        }
        debug!(
            prefix = %self.prefix,
            count = updates.len(),
            "applying discovery updates"
        );
        self.session.apply_updates(&updates);
    }

    /// Sleep the fixed backoff; returns false when the stop token fired first
    async fn backoff_or_stop(&self, stop: &CancellationToken) -> bool {
        tokio::select! {
            _ = stop.cancelled() => false,
            _ = tokio::time::sleep(self.backoff) => true,
        }
    }
}

/// Diff one full set (a listing or a watch batch) against the snapshot:
/// adds for new addresses and modifies for changed metadata first, in batch
/// order, deletes for vanished addresses last. Identity for add/delete is
/// the address alone; metadata changes only ever produce a modify. The very
/// first listing runs against an empty snapshot and therefore emits only
/// adds.
fn diff_snapshot(
    snapshot: &mut HashMap<String, String>,
    pairs: Vec<KvPair>,
) -> Vec<EndpointUpdate> {
    let mut current = HashMap::with_capacity(pairs.len());
    let mut updates = Vec::new();
    for pair in pairs {
        let Some((address, metadata)) = decode_pair(&pair) else {
            continue;
        };
        match snapshot.get(&address) {
            None => updates.push(EndpointUpdate::Add {
                address: address.clone(),
                metadata: metadata.clone(),
            }),
            Some(old) if old != &metadata => updates.push(EndpointUpdate::Modify {
                address: address.clone(),
                metadata: metadata.clone(),
            }),
            Some(_) => {}
        }
        current.insert(address, metadata);
    }
    for address in snapshot.keys() {
        if !current.contains_key(address) {
            updates.push(EndpointUpdate::Delete {
                address: address.clone(),
            });
        }
    }
    *snapshot = current;
    updates
}

/// Decode one registry entry into `(address, metadata)`. Keys are
/// URL-encoded endpoint addresses; an undecodable key is logged and skipped
/// rather than poisoning the batch.
fn decode_pair(pair: &KvPair) -> Option<(String, String)> {
    match urlencoding::decode(&pair.key) {
        Ok(address) => Some((address.into_owned(), pair.value.clone())),
        Err(err) => {
            warn!(key = %pair.key, error = %err, "failed to decode registry key, skipping");
            None
        }
    }
}
