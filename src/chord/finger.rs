use crate::chord::types::{Identifier, RingId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Routing table of a single peer.
///
/// Entry `i` caches the best known successor of ring position `owner + 2^i`, so index 0 covers
/// the position one hop away, index 1 the position two hops away, doubling up to `2^(m-1)`.
/// The ring modulus is `2^m` where `m` is the number of entries, which lets small tables model
/// small rings; production tables have `m = 16`.
///
/// Entries are only ever replaced, never removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerTable {
    owner: Identifier,
    entries: Vec<Identifier>,
}

impl FingerTable {
    /// A table for a ring of one: every entry points back at `owner`.
    pub fn new(size: usize, owner: Identifier) -> Self {
        assert!(
            (1..=16).contains(&size),
            "finger table size must be between 1 and 16"
        );
        Self {
            entries: vec![owner.clone(); size],
            owner,
        }
    }

    pub fn from_entries(owner: Identifier, entries: Vec<Identifier>) -> Self {
        assert!(
            (1..=16).contains(&entries.len()),
            "finger table size must be between 1 and 16"
        );
        Self { owner, entries }
    }

    pub fn owner(&self) -> &Identifier {
        &self.owner
    }

    pub fn entries(&self) -> &[Identifier] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Identifier> {
        self.entries.get(index)
    }

    pub fn set(&mut self, index: usize, peer: Identifier) {
        if self.entries[index] != peer {
            debug!(index, from = ?self.entries[index], to = ?peer, "finger set");
            self.entries[index] = peer;
        }
    }

    /// The ring position covered by `index`: `(owner + 2^index) mod 2^m`.
    pub fn ring_position_of_index(&self, index: usize) -> RingId {
        let modulus = 1u32 << self.entries.len();
        let position = (self.owner.value() as u32 + (1u32 << index)) % modulus;
        RingId::new(position as u16)
    }

    /// Whether the first entry is already the authoritative successor of `k`.
    pub fn knows_final_successor_of(&self, k: RingId) -> bool {
        k == self.owner.id || k.is_between(self.owner.id, self.entries[0].id)
    }

    /// The first entry whose arc from the owner reaches `k`, or the last entry when none does.
    pub fn successor(&self, k: RingId) -> &Identifier {
        if k == self.owner.id {
            return &self.owner;
        }
        self.entries
            .iter()
            .find(|peer| k.is_between(self.owner.id, peer.id))
            .unwrap_or_else(|| &self.entries[self.entries.len() - 1])
    }

    /// The entry closest to `k` that still lies strictly inside `(owner, k)`.
    pub fn closest_preceding(&self, k: RingId) -> Option<&Identifier> {
        self.entries
            .iter()
            .filter(|peer| peer.id != k && peer.id.is_between(self.owner.id, k))
            .max_by_key(|peer| RingId::distance_clockwise(self.owner.id, peer.id))
    }

    /// Tightens every entry that `peer` lands in front of. Returns how many entries changed.
    pub fn update_with_successor(&mut self, peer: &Identifier) -> usize {
        let mut updated = 0;
        for index in 0..self.entries.len() {
            let position = self.ring_position_of_index(index);
            let current = &self.entries[index];
            if *current == *peer {
                continue;
            }
            // successor(position) is the first node with id >= position, so the arc is closed
            // at both ends
            if peer.id == position || peer.id.is_between(position, current.id) {
                info!(
                    index,
                    position = position.value(),
                    from = current.value(),
                    to = peer.value(),
                    "updated finger"
                );
                self.entries[index] = peer.clone();
                updated += 1;
            }
        }
        updated
    }
}

impl fmt::Display for FingerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Finger Table for {}:", self.owner)?;
        for (index, peer) in self.entries.iter().enumerate() {
            writeln!(
                f,
                "{:>2} [{}]: {}",
                index,
                self.ring_position_of_index(index),
                peer
            )?;
        }
        Ok(())
    }
}
