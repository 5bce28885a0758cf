//! # rpc-balancer
//!
//! Client-side load balancing and service discovery runtime for RPC clients.
//! The crate maintains a live, weighted set of backend endpoints per logical
//! service and selects one endpoint per outbound call under interchangeable
//! strategies (round robin, smooth weighted round robin, random, weighted
//! random), while a companion watcher keeps that set synchronized with a
//! key-value service registry.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rpc_balancer::{BalanceConfig, BalanceSession, MemoryStore, PickOptions, Watcher};
//!
//! # async fn run() -> rpc_balancer::BalanceResult<()> {
//! let config = BalanceConfig::default();
//! let session = Arc::new(BalanceSession::new("greeter", &config));
//!
//! let store = Arc::new(MemoryStore::new());
//! let prefix = config.registry.service_prefix("greeter");
//! Watcher::new(store, session.clone(), prefix, config.discovery_backoff).spawn();
//!
//! // transport layer reports connectivity; callers pick endpoints
//! let picked = session
//!     .pick(PickOptions::blocking_with_timeout(Duration::from_secs(1)))
//!     .await?;
//! println!("dialing {}", picked.address);
//! # Ok(())
//! # }
//! ```

/// Core functionality: error types, configuration, shared data structures
pub mod core;

/// Load balancing: endpoint table, selection strategies, session facade
pub mod balancing;

/// Service discovery: store interface, in-memory backend, watcher loop
pub mod discovery;

// Re-export the public API surface so users don't need to know the module
// layout.
pub use crate::balancing::{
    BalanceSession, EndpointPickStats, PickOptions, Picked, SessionStats, StrategyKind,
};
pub use crate::core::config::{BalanceConfig, RegistryConfig, DEFAULT_WEIGHT};
pub use crate::core::error::{BalanceError, BalanceResult};
pub use crate::core::types::{Endpoint, EndpointUpdate};
pub use crate::discovery::{
    DiscoveryError, DiscoveryStore, KvPair, MemoryStore, WatchFeed, Watcher,
};
