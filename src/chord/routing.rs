//! The decision every peer makes for a `FindSuccessorRequest` or `LookupRequest`: answer from
//! local knowledge, or hand the request to a closer peer.
//!
//! Everything here is pure over a snapshot of the peer's state, so the processor can take the
//! state lock, decide, drop the lock and only then talk to the network.

use crate::chord::finger::FingerTable;
use crate::chord::types::{Identifier, RingId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Reply to the requester with this peer.
    Answer(Identifier),
    /// Relay the request to this peer and pass its reply back.
    Forward(Identifier),
}

/// Routing for `FindSuccessorRequest(k)` as seen from the owner of `table`.
///
/// The peer that started the search plays no part here: the next hop precedes `k`, so it is
/// never the answer, even when it happens to be the requester. Every forward moves strictly
/// clockwise towards `k` and the hop ceiling bounds the chain.
pub fn find_successor(table: &FingerTable, k: RingId) -> Route {
    if table.knows_final_successor_of(k) {
        return Route::Answer(table.successor(k).clone());
    }

    let next = next_hop(table, k);
    if next == *table.owner() {
        return Route::Answer(next);
    }
    Route::Forward(next)
}

/// Routing for `LookupRequest(k)`: placement of a content key.
///
/// The receiving peer keeps the key when it falls between its predecessor and itself;
/// otherwise the lookup travels exactly like a successor search.
pub fn lookup(table: &FingerTable, predecessor: &Identifier, k: RingId) -> Route {
    let owner = table.owner();
    if owns(owner, predecessor, k) {
        return Route::Answer(owner.clone());
    }
    if table.knows_final_successor_of(k) {
        return Route::Answer(table.successor(k).clone());
    }

    let next = next_hop(table, k);
    if next == *owner {
        return Route::Answer(next);
    }
    Route::Forward(next)
}

/// Whether `owner` is responsible for `k` given its current predecessor.
pub fn owns(owner: &Identifier, predecessor: &Identifier, k: RingId) -> bool {
    k == owner.id || predecessor == owner || k.is_between(predecessor.id, owner.id)
}

// The closest preceding finger always moves the request clockwise towards k without passing
// it; the plain successor rule is only the fallback when no finger precedes k.
fn next_hop(table: &FingerTable, k: RingId) -> Identifier {
    table
        .closest_preceding(k)
        .unwrap_or_else(|| table.successor(k))
        .clone()
}
