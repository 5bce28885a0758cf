//! # Endpoint Table
//!
//! The authoritative set of known endpoints for one logical service. The
//! table is plain single-threaded data: it is owned by exactly one balancer
//! session and every access goes through that session's mutex. Entries keep
//! insertion order so round-robin rotation and update batches stay
//! deterministic.

use tracing::{debug, warn};

use crate::core::types::{parse_weight, Endpoint};

/// Mapping from address to endpoint state, with uniqueness enforced on the
/// address. Entries are created on first `add`, updated in place on `modify`,
/// and removed on `remove`; the table lives as long as its session.
#[derive(Debug)]
pub struct EndpointTable {
    endpoints: Vec<Endpoint>,
    default_weight: u32,
}

impl EndpointTable {
    /// Create an empty table using `default_weight` for invalid metadata
    pub fn new(default_weight: u32) -> Self {
        Self {
            endpoints: Vec::new(),
            default_weight,
        }
    }

    /// Add a newly discovered endpoint.
    ///
    /// Adding an address that is already present is a logged no-op, so
    /// replaying a delta batch cannot disturb existing state. New endpoints
    /// start disconnected.
    pub fn add(&mut self, address: &str, metadata: &str) -> bool {
        if self.position(address).is_some() {
            warn!(address, "discovery tried to add an existing address");
            return false;
        }
        let weight = parse_weight(metadata, self.default_weight);
        debug!(address, weight, "adding endpoint");
        self.endpoints.push(Endpoint::new(address, weight));
        true
    }

    /// Update the declared weight of an existing endpoint from fresh
    /// metadata, leaving connectivity and smoothing state untouched.
    /// No-op if the address is unknown.
    pub fn modify(&mut self, address: &str, metadata: &str) -> bool {
        let weight = parse_weight(metadata, self.default_weight);
        match self.position(address) {
            Some(i) => {
                let ep = &mut self.endpoints[i];
                debug!(address, old_weight = ep.weight, weight, "modifying endpoint");
                ep.weight = weight;
                ep.effective_weight = weight;
                true
            }
            None => {
                debug!(address, "modify for unknown address ignored");
                false
            }
        }
    }

    /// Remove an endpoint. No-op if the address is unknown.
    pub fn remove(&mut self, address: &str) -> bool {
        match self.position(address) {
            Some(i) => {
                debug!(address, "removing endpoint");
                self.endpoints.remove(i);
                true
            }
            None => false,
        }
    }

    /// Flip an endpoint's connectivity flag.
    ///
    /// Returns true iff this call made the first connected endpoint appear
    /// (the 0 to 1 transition that releases blocked picks). Re-marking an
    /// endpoint with its current state is a no-op returning false.
    pub fn set_connected(&mut self, address: &str, connected: bool) -> bool {
        let Some(i) = self.position(address) else {
            debug!(address, connected, "connectivity report for unknown address ignored");
            return false;
        };
        if self.endpoints[i].connected == connected {
            return false;
        }
        self.endpoints[i].connected = connected;
        connected && self.connected_count() == 1
    }

    /// Indices of endpoints satisfying the candidate filter:
    /// `(!filter_connected || connected) && (!filter_weight || weight > 0)`.
    pub fn candidates(&self, filter_weight: bool, filter_connected: bool) -> Vec<usize> {
        self.endpoints
            .iter()
            .enumerate()
            .filter(|(_, ep)| {
                (!filter_connected || ep.connected) && (!filter_weight || ep.weight > 0)
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of currently connected endpoints
    pub fn connected_count(&self) -> usize {
        self.endpoints.iter().filter(|ep| ep.connected).count()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Borrow an endpoint by table index
    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    /// Iterate endpoints in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub(crate) fn endpoints_mut(&mut self) -> &mut [Endpoint] {
        &mut self.endpoints
    }

    fn position(&self, address: &str) -> Option<usize> {
        self.endpoints.iter().position(|ep| ep.address() == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EndpointTable {
        let mut t = EndpointTable::new(10);
        t.add("a:1", "weight=50");
        t.add("b:1", "weight=100");
        t.add("c:1", "weight=0");
        t
    }

    #[test]
    fn add_existing_is_noop() {
        let mut t = table();
        assert!(!t.add("a:1", "weight=999"));
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(0).unwrap().weight, 50);
    }

    #[test]
    fn modify_updates_weights_only() {
        let mut t = table();
        t.set_connected("a:1", true);
        t.endpoints_mut()[0].current_weight = 7;

        assert!(t.modify("a:1", "weight=75"));
        let ep = t.get(0).unwrap();
        assert_eq!(ep.weight, 75);
        assert_eq!(ep.effective_weight, 75);
        assert_eq!(ep.current_weight, 7);
        assert!(ep.connected);

        assert!(!t.modify("nope:1", "weight=1"));
    }

    #[test]
    fn remove_preserves_order() {
        let mut t = table();
        assert!(t.remove("b:1"));
        assert!(!t.remove("b:1"));
        let addrs: Vec<_> = t.iter().map(|ep| ep.address().to_string()).collect();
        assert_eq!(addrs, vec!["a:1", "c:1"]);
    }

    #[test]
    fn set_connected_reports_first_transition() {
        let mut t = table();
        assert!(t.set_connected("a:1", true));
        assert!(!t.set_connected("a:1", true)); // idempotent
        assert!(!t.set_connected("b:1", true)); // already one connected
        assert!(!t.set_connected("a:1", false));
        assert!(!t.set_connected("b:1", false));
        // back to zero connected, next up is a 0->1 transition again
        assert!(t.set_connected("c:1", true));
    }

    #[test]
    fn candidate_filters() {
        let mut t = table();
        t.set_connected("a:1", true);
        t.set_connected("c:1", true);

        assert_eq!(t.candidates(false, false).len(), 3);
        assert_eq!(t.candidates(true, false).len(), 2); // c excluded, weight 0
        assert_eq!(t.candidates(false, true).len(), 2); // b excluded, not connected
        assert_eq!(t.candidates(true, true), vec![0]); // only a qualifies
    }
}
