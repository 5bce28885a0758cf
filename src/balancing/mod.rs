//! Load balancing core: the endpoint table, the selection strategies, and
//! the session facade tying them together.

pub mod session;
pub mod strategies;
pub mod table;

pub use session::{BalanceSession, EndpointPickStats, PickOptions, Picked, SessionStats};
pub use strategies::{Strategy, StrategyKind};
pub use table::EndpointTable;
