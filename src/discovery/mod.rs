//! Service discovery: the store collaborator interface, an in-memory
//! implementation, and the watcher that turns registry snapshots into
//! endpoint-table deltas.

pub mod memory;
pub mod store;
pub mod watcher;

pub use memory::MemoryStore;
pub use store::{DiscoveryError, DiscoveryStore, KvPair, WatchFeed};
pub use watcher::Watcher;
