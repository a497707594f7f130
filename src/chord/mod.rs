pub mod finger;
pub mod peer;
pub mod routing;
pub mod types;

// Chord configuration
pub const ID_SIZE_BITS: u32 = 16;
pub const RING_SIZE: u32 = 1 << ID_SIZE_BITS;
pub const FINGER_TABLE_SIZE: usize = ID_SIZE_BITS as usize;

/// Ceiling on how many times a single lookup may be forwarded before it is failed.
pub const MAX_FORWARD_HOPS: usize = FINGER_TABLE_SIZE;

pub const DISCOVERY_PORT: u16 = 9000;
pub const PEER_PORT: u16 = 9001;
