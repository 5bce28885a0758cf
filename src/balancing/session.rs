//! # Balancer Session
//!
//! The facade combining an endpoint table with a selection strategy. A
//! session is shared by three independent execution contexts: caller tasks
//! invoking [`BalanceSession::pick`], the transport layer reporting
//! connectivity via [`BalanceSession::up`] / [`BalanceSession::down`], and
//! the discovery watcher applying endpoint deltas through
//! [`BalanceSession::apply_updates`]. All of them serialize through one
//! mutex, which is never held across an await point.
//!
//! Blocking picks park on a wait gate: a `CancellationToken` standing in for
//! the close-and-replace channel idiom. Exactly one live gate exists at a
//! time; it is cancelled exactly when the connected endpoint count
//! transitions from zero to one, and a fresh gate is installed atomically
//! with that transition. Cancelled tokens are level-triggered, so a waiter
//! that races the transition still wakes and re-evaluates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::balancing::strategies::{Strategy, StrategyKind};
use crate::balancing::table::EndpointTable;
use crate::core::config::BalanceConfig;
use crate::core::error::{BalanceError, BalanceResult};
use crate::core::types::{Endpoint, EndpointUpdate};

/// Options for a single pick call
#[derive(Debug, Clone, Default)]
pub struct PickOptions {
    /// When true, suspend until a connected endpoint appears instead of
    /// failing over to unreachable candidates
    pub blocking_wait: bool,
    /// Deadline for a blocking wait; `DeadlineExceeded` when it elapses
    pub timeout: Option<Duration>,
    /// Caller-supplied cancellation; `Cancelled` when it fires first
    pub cancel: Option<CancellationToken>,
}

impl PickOptions {
    /// Fail-fast pick: never blocks, accepts unreachable-but-declared
    /// endpoints rather than failing when nothing is connected
    pub fn fail_fast() -> Self {
        Self::default()
    }

    /// Blocking pick without a deadline
    pub fn blocking() -> Self {
        Self {
            blocking_wait: true,
            ..Self::default()
        }
    }

    /// Blocking pick bounded by `timeout`
    pub fn blocking_with_timeout(timeout: Duration) -> Self {
        Self {
            blocking_wait: true,
            timeout: Some(timeout),
            cancel: None,
        }
    }

    /// Attach a caller-owned cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// A successful pick: the endpoint chosen for one outbound call.
///
/// The caller reports a failed connection attempt back through
/// [`BalanceSession::report_failure`], which maps to a down transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Picked {
    pub address: String,
    pub weight: u32,
}

/// Per-endpoint pick statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct EndpointPickStats {
    pub selections: u64,
    pub last_selected: Option<DateTime<Utc>>,
}

/// Point-in-time statistics for one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub service: String,
    pub strategy: StrategyKind,
    pub total_picks: u64,
    pub failed_picks: u64,
    pub endpoints: HashMap<String, EndpointPickStats>,
}

/// State guarded by the session mutex: the table, the strategy counters,
/// the wait gate, and the closed flag move together.
#[derive(Debug)]
struct Inner {
    table: EndpointTable,
    strategy: Strategy,
    gate: CancellationToken,
    closed: bool,
}

/// A live, weighted endpoint set for one logical service plus the selection
/// strategy picking from it. One session per service; sessions never share
/// state or locks with each other.
pub struct BalanceSession {
    service: String,
    weighted: bool,
    inner: Mutex<Inner>,
    /// Stop signal shared with the companion discovery watcher
    stop: CancellationToken,
    total_picks: AtomicU64,
    failed_picks: AtomicU64,
    pick_stats: DashMap<String, EndpointPickStats>,
}

impl BalanceSession {
    /// Create a session for `service` from process-wide configuration
    pub fn new<S: Into<String>>(service: S, config: &BalanceConfig) -> Self {
        let service = service.into();
        info!(
            service = %service,
            strategy = config.strategy.name(),
            weighted = config.weighted,
            "creating balancer session"
        );
        Self {
            service,
            weighted: config.weighted,
            inner: Mutex::new(Inner {
                table: EndpointTable::new(config.default_weight),
                strategy: Strategy::new(config.strategy),
                gate: CancellationToken::new(),
                closed: false,
            }),
            stop: CancellationToken::new(),
            total_picks: AtomicU64::new(0),
            failed_picks: AtomicU64::new(0),
            pick_stats: DashMap::new(),
        }
    }

    /// The logical service this session balances
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Stop signal for the companion watcher; cancelled by [`Self::close`]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Select one endpoint for an outbound call.
    ///
    /// A fail-fast pick returns `NoEndpointAvailable` only when even the
    /// relaxed (disconnected-allowed) candidate set is empty. A blocking pick
    /// suspends while no connected candidate exists and wakes on the first
    /// up transition, the caller's deadline/cancellation, or session closure.
    /// Dropping the returned future is also a clean cancellation; the gate
    /// retains no state for abandoned waiters.
    pub async fn pick(&self, opts: PickOptions) -> BalanceResult<Picked> {
        self.total_picks.fetch_add(1, Ordering::Relaxed);
        counter!("balancer_picks").increment(1);

        let result = match &opts.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(BalanceError::Cancelled),
                    r = self.pick_with_deadline(opts.blocking_wait, opts.timeout) => r,
                }
            }
            None => self.pick_with_deadline(opts.blocking_wait, opts.timeout).await,
        };

        match &result {
            Ok(picked) => self.record_pick(picked),
            Err(err) => {
                self.failed_picks.fetch_add(1, Ordering::Relaxed);
                counter!("balancer_failed_picks").increment(1);
                debug!(service = %self.service, error = %err, "pick failed");
            }
        }
        result
    }

    async fn pick_with_deadline(
        &self,
        blocking: bool,
        timeout: Option<Duration>,
    ) -> BalanceResult<Picked> {
        match timeout {
            Some(t) => match tokio::time::timeout(t, self.pick_inner(blocking)).await {
                Ok(result) => result,
                Err(_) => Err(BalanceError::DeadlineExceeded {
                    timeout_ms: t.as_millis() as u64,
                }),
            },
            None => self.pick_inner(blocking).await,
        }
    }

    async fn pick_inner(&self, blocking: bool) -> BalanceResult<Picked> {
        loop {
            let gate = {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(BalanceError::SessionClosed);
                }
                let candidates = inner.table.candidates(self.weighted, true);
                if !candidates.is_empty() {
                    return Ok(Self::choose(&mut inner, &candidates));
                }
                if !blocking {
                    // Fail-fast path: accept declared-but-unreachable
                    // endpoints rather than fail the call outright.
                    let relaxed = inner.table.candidates(self.weighted, false);
                    if relaxed.is_empty() {
                        return Err(BalanceError::no_endpoint(&self.service));
                    }
                    debug!(
                        service = %self.service,
                        "no connected endpoint, failing over to unconnected candidate"
                    );
                    return Ok(Self::choose(&mut inner, &relaxed));
                }
                inner.gate.clone()
            };
            // Wait for the 0->1 connectivity transition (or closure, which
            // also cancels the gate), then re-evaluate from the top. A waiter
            // whose endpoint was immediately taken down again re-blocks on
            // the fresh gate instead of erroring.
            gate.cancelled().await;
        }
    }

    fn choose(inner: &mut Inner, candidates: &[usize]) -> Picked {
        let Inner {
            table, strategy, ..
        } = inner;
        let index = strategy.select(table.endpoints_mut(), candidates);
        let ep = table.get(index).expect("strategy returned a table index");
        Picked {
            address: ep.address().to_string(),
            weight: ep.weight,
        }
    }

    fn record_pick(&self, picked: &Picked) {
        let mut stats = self
            .pick_stats
            .entry(picked.address.clone())
            .or_default();
        stats.selections += 1;
        stats.last_selected = Some(Utc::now());
        debug!(
            service = %self.service,
            address = %picked.address,
            weight = picked.weight,
            "selected endpoint"
        );
    }

    /// Transport report: `address` became reachable.
    ///
    /// Idempotent. On the transition from zero to one connected endpoints the
    /// live wait gate is cancelled and replaced, releasing every blocked pick
    /// to re-evaluate.
    pub fn up(&self, address: &str) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        if inner.table.set_connected(address, true) {
            debug!(
                service = %self.service,
                address,
                "first endpoint connected, releasing blocked picks"
            );
            let gate = std::mem::replace(&mut inner.gate, CancellationToken::new());
            gate.cancel();
        }
    }

    /// Transport report: `address` became unreachable.
    ///
    /// Never touches the gate: callers wait only for availability to appear.
    pub fn down(&self, address: &str) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.table.set_connected(address, false);
    }

    /// Caller report that a connection attempt to a picked endpoint failed.
    /// Equivalent to a transport down transition.
    pub fn report_failure(&self, address: &str) {
        debug!(service = %self.service, address, "caller reported connection failure");
        self.down(address);
    }

    /// Apply a batch of discovery deltas atomically with respect to picks.
    ///
    /// A delete resets the round-robin cursor; replaying a batch is harmless
    /// because every table operation is idempotent. No-op after closure, so
    /// a watcher racing shutdown cannot resurrect state.
    pub fn apply_updates(&self, updates: &[EndpointUpdate]) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        for update in updates {
            match update {
                EndpointUpdate::Add { address, metadata } => {
                    inner.table.add(address, metadata);
                }
                EndpointUpdate::Modify { address, metadata } => {
                    inner.table.modify(address, metadata);
                }
                EndpointUpdate::Delete { address } => {
                    if inner.table.remove(address) {
                        inner.strategy.note_removal();
                    }
                }
            }
        }
    }

    /// Close the session.
    ///
    /// Idempotent: the first call marks the session closed and cancels the
    /// live gate so blocked picks observe closure instead of hanging; it also
    /// cancels the watcher stop token. Later calls are no-ops and never
    /// touch an already-released gate.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.gate.cancel();
        }
        self.stop.cancel();
        info!(service = %self.service, "balancer session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Clone of the current endpoint set, in table order. Intended for
    /// diagnostics and tests; picks never go through this copy.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.inner.lock().table.iter().cloned().collect()
    }

    /// Point-in-time pick statistics
    pub fn stats(&self) -> SessionStats {
        let strategy = self.inner.lock().strategy.kind();
        SessionStats {
            service: self.service.clone(),
            strategy,
            total_picks: self.total_picks.load(Ordering::Relaxed),
            failed_picks: self.failed_picks.load(Ordering::Relaxed),
            endpoints: self
                .pick_stats
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}

impl std::fmt::Debug for BalanceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceSession")
            .field("service", &self.service)
            .field("weighted", &self.weighted)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for BalanceSession {
    fn drop(&mut self) {
        // make sure a forgotten close still stops the watcher loop
        self.stop.cancel();
    }
}
