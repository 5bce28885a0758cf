//! # Core Types
//!
//! Fundamental data structures shared by the balancing and discovery
//! subsystems: the per-backend [`Endpoint`] record, the [`EndpointUpdate`]
//! delta vocabulary emitted by the discovery watcher, and the registry
//! metadata parser.

use serde::Serialize;
use tracing::warn;

/// One network-addressable backend instance of a logical service.
///
/// The `address` is the unique key within a service's endpoint table and is
/// immutable once the endpoint is created. All other fields are mutated in
/// place so that in-flight smoothing state survives metadata updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    address: String,
    /// Declared capacity weight from registry metadata
    pub weight: u32,
    /// Working weight used by the smoothing algorithm; initialized to
    /// `weight` and kept as a distinct field so failure-based weight decay
    /// can adjust it without losing the declared value
    pub effective_weight: u32,
    /// Running accumulator used only by smooth weighted round robin
    pub current_weight: i64,
    /// Liveness flag, flipped only by transport-reported up/down transitions
    pub connected: bool,
}

impl Endpoint {
    /// Create a new endpoint with the given declared weight.
    ///
    /// New endpoints start disconnected with a zeroed smoothing accumulator.
    pub fn new<S: Into<String>>(address: S, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
            effective_weight: weight,
            current_weight: 0,
            connected: false,
        }
    }

    /// The endpoint's connection address (`host:port`)
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// A single delta computed by the discovery watcher against its last-known
/// snapshot, applied to the endpoint table in batch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointUpdate {
    /// Address present now but absent from the previous snapshot
    Add { address: String, metadata: String },
    /// Address present in both snapshots with different metadata
    Modify { address: String, metadata: String },
    /// Address present in the previous snapshot but absent now
    Delete { address: String },
}

impl EndpointUpdate {
    /// The address this update applies to
    pub fn address(&self) -> &str {
        match self {
            Self::Add { address, .. } => address,
            Self::Modify { address, .. } => address,
            Self::Delete { address } => address,
        }
    }
}

/// Parse the `weight` key out of registry metadata.
///
/// Metadata is an opaque `key=value&key=value` string. A missing `weight`
/// key, a malformed pair, an unparseable number, or a negative value all
/// fall back to `default_weight` with a warning; invalid metadata is never
/// fatal.
pub fn parse_weight(metadata: &str, default_weight: u32) -> u32 {
    for item in metadata.split('&') {
        if item.is_empty() {
            continue;
        }
        let mut kv = item.splitn(2, '=');
        let key = kv.next().unwrap_or_default();
        let value = match kv.next() {
            Some(v) => v,
            None => {
                warn!(metadata, "metadata pair format invalid");
                continue;
            }
        };
        if key != "weight" {
            continue;
        }
        return match value.parse::<i64>() {
            Ok(w) if w < 0 => {
                warn!(
                    weight = w,
                    default_weight, "negative weight in metadata, using default"
                );
                default_weight
            }
            Ok(w) => w.min(u32::MAX as i64) as u32,
            Err(err) => {
                warn!(
                    value,
                    default_weight,
                    error = %err,
                    "failed to parse weight from metadata, using default"
                );
                default_weight
            }
        };
    }
    default_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_weight_key() {
        assert_eq!(parse_weight("weight=50", 10), 50);
        assert_eq!(parse_weight("region=us&weight=3", 10), 3);
        assert_eq!(parse_weight("weight=0", 10), 0);
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(parse_weight("", 10), 10);
        assert_eq!(parse_weight("region=us", 10), 10);
        assert_eq!(parse_weight("weight=abc", 10), 10);
        assert_eq!(parse_weight("weight=-5", 10), 10);
        assert_eq!(parse_weight("weight", 10), 10);
    }

    #[test]
    fn endpoint_starts_disconnected() {
        let ep = Endpoint::new("10.0.0.1:8080", 50);
        assert_eq!(ep.address(), "10.0.0.1:8080");
        assert_eq!(ep.weight, 50);
        assert_eq!(ep.effective_weight, 50);
        assert_eq!(ep.current_weight, 0);
        assert!(!ep.connected);
    }
}
