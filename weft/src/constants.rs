use crate::types::Tag;

/// Transport tag carrying envelope-prefixed active messages.
pub const ACTIVE_TAG: Tag = 0;

/// First transport tag the runtime mints for its own out-of-band data
/// streams. User tags passed to `send_data` must stay below this.
pub const FIRST_DATA_TAG: Tag = 1 << 16;

/// Forwarding hops a routed element message may take before falling back to
/// a home query.
pub const MAX_FORWARD_HOPS: u8 = 3;

/// Default payload size boundary between the eager and rendezvous paths.
pub const EAGER_THRESHOLD_BYTES: usize = 1024;

/// Default size of one rendezvous fragment.
pub const FRAGMENT_BYTES: usize = 4096;

/// Default capacity of a location manager's lookup cache.
pub const LOCATION_CACHE_CAPACITY: usize = 256;
