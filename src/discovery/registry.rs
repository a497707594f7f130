use crate::chord::types::{Identifier, RingId};
use rand::seq::IteratorRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Members known to the discovery node, keyed by ring id.
#[derive(Debug, Default)]
pub struct Registry {
    peers: BTreeMap<RingId, Identifier>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether some member already uses `id`, whatever its hostname.
    pub fn contains_id(&self, id: RingId) -> bool {
        self.peers.contains_key(&id)
    }

    /// Records a member. Returns false when its id is already taken.
    pub fn insert(&mut self, peer: Identifier) -> bool {
        if self.contains_id(peer.id) {
            return false;
        }
        self.peers.insert(peer.id, peer);
        true
    }

    /// Forgets `peer`. Only an exact match is removed.
    pub fn remove(&mut self, peer: &Identifier) -> bool {
        match self.peers.get(&peer.id) {
            Some(known) if known == peer => {
                self.peers.remove(&peer.id);
                true
            }
            _ => false,
        }
    }

    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Identifier> {
        self.peers.values().choose(rng).cloned()
    }

    /// Members in ring order.
    pub fn peers(&self) -> Vec<Identifier> {
        self.peers.values().cloned().collect()
    }
}
