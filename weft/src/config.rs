use std::time::Duration;

use crate::constants;

/// Tunables for one runtime instance. All fields have working defaults;
/// override with struct update syntax:
///
/// ```
/// use weft::RuntimeConfig;
///
/// let config = RuntimeConfig {
///     eager_threshold_bytes: 256,
///     ..RuntimeConfig::default()
/// };
/// assert_eq!(config.max_forward_hops, 3);
/// ```
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Serialized payloads up to this size are sent inline with the
    /// envelope; larger ones go through the rendezvous protocol.
    pub eager_threshold_bytes: usize,
    /// Size of one rendezvous data fragment.
    pub fragment_bytes: usize,
    /// Entries kept in each location manager's lookup cache.
    pub location_cache_capacity: usize,
    /// Forwarding hops before a routed message falls back to a home query.
    pub max_forward_hops: u8,
    /// Minimum spacing between termination waves started by the wave root.
    pub wave_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            eager_threshold_bytes: constants::EAGER_THRESHOLD_BYTES,
            fragment_bytes: constants::FRAGMENT_BYTES,
            location_cache_capacity: constants::LOCATION_CACHE_CAPACITY,
            max_forward_hops: constants::MAX_FORWARD_HOPS,
            wave_interval: Duration::ZERO,
        }
    }
}
