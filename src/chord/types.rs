use crate::error::ChordError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// RingId represents a position on the 16-bit Chord ring, for a node or a stored item.
///
/// Ordering on the ring is circular, so the derived `Ord` is only useful for sorting; routing
/// code must go through [`RingId::is_between`] and [`RingId::distance_clockwise`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RingId(u16);

impl fmt::Debug for RingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RingId({} / {})", self.to_hex(), self.0)
    }
}

impl fmt::Display for RingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl RingId {
    pub const fn new(value: u16) -> Self {
        RingId(value)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// Parses 1 to 4 hex digits, e.g. "3dcf" or "6".
    pub fn from_hex(hex: &str) -> Result<Self, ChordError> {
        let trimmed = hex.trim();
        if trimmed.is_empty() || trimmed.len() > 4 {
            return Err(ChordError::InvalidNodeId(format!(
                "expected 1 to 4 hex digits, got {:?}",
                hex
            )));
        }
        u16::from_str_radix(trimmed, 16)
            .map(RingId)
            .map_err(|e| ChordError::InvalidNodeId(format!("{:?}: {}", hex, e)))
    }

    /// Canonical 4-digit lowercase hex form, as carried on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Number of clockwise steps from `from` to `to`.
    pub fn distance_clockwise(from: RingId, to: RingId) -> u32 {
        to.0.wrapping_sub(from.0) as u32
    }

    /// True when `self` lies on the arc that starts just after `lo` and ends at `hi` inclusive,
    /// wrapping past zero when `lo > hi`. An arc with `lo == hi` is empty.
    pub fn is_between(&self, lo: RingId, hi: RingId) -> bool {
        let k = self.0;
        if lo.0 <= hi.0 {
            lo.0 < k && k <= hi.0
        } else {
            k > lo.0 || k <= hi.0
        }
    }
}

impl From<u16> for RingId {
    fn from(value: u16) -> Self {
        RingId(value)
    }
}

impl FromStr for RingId {
    type Err = ChordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RingId::from_hex(s)
    }
}

impl From<RingId> for String {
    fn from(id: RingId) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for RingId {
    type Error = ChordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RingId::from_hex(&value)
    }
}

/// A network-addressable ring member. Two identifiers are equal only when both the hostname and
/// the ring id match.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub hostname: String,
    pub id: RingId,
}

impl Identifier {
    pub fn new(hostname: impl Into<String>, id: RingId) -> Self {
        Self {
            hostname: hostname.into(),
            id,
        }
    }

    pub fn value(&self) -> u16 {
        self.id.value()
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.hostname)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ hostname: \"{}\", id: \"{}\" ({}) }}",
            self.hostname,
            self.id,
            self.id.value()
        )
    }
}

/// A file held by the peer responsible for its key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub key: RingId,
    pub name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl StoredItem {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
