use crate::chord::finger::FingerTable;
use crate::chord::types::{Identifier, RingId, StoredItem};
use crate::error::{ChordError, DiscoveryError, NetworkError};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn, Instrument, Span};

/// Outcome of asking the rendezvous service to admit a candidate id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub accepted: bool,
    /// An existing member to contact, or the candidate itself when the ring is empty.
    pub contact: Identifier,
}

/// The bootstrap/rendezvous service as the ring core sees it.
#[async_trait]
pub trait Rendezvous: Send + Sync {
    async fn register(&self, candidate: &Identifier) -> Result<Registration, DiscoveryError>;
    async fn random_peer(&self) -> Result<Identifier, DiscoveryError>;
    async fn announce_join(&self, peer: &Identifier) -> Result<(), DiscoveryError>;
    async fn announce_exit(&self, peer: &Identifier) -> Result<(), DiscoveryError>;
}

/// Outbound peer-to-peer calls needed by the join protocol. Every call is one blocking round
/// trip on a fresh connection.
#[async_trait]
pub trait RingTransport: Send + Sync {
    async fn find_successor(
        &self,
        via: &Identifier,
        target: RingId,
        requester: &Identifier,
    ) -> Result<Identifier, NetworkError>;
    async fn get_predecessor(&self, peer: &Identifier) -> Result<Identifier, NetworkError>;
    async fn notify_predecessor(
        &self,
        peer: &Identifier,
        new_predecessor: &Identifier,
    ) -> Result<(), NetworkError>;
    async fn notify_successor(
        &self,
        peer: &Identifier,
        new_successor: &Identifier,
    ) -> Result<(), NetworkError>;
    async fn announce_join(&self, peer: &Identifier, joined: &Identifier)
        -> Result<(), NetworkError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum JoinPhase {
    Unjoined,
    Registering,
    LocatingSuccessor,
    ExchangingNotifications,
    RefreshingFingerTable,
    Joined,
    Left,
}

impl fmt::Display for JoinPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Mutable ring state of one peer. Only reachable through [`Peer::state`].
#[derive(Debug)]
pub struct PeerState {
    pub predecessor: Identifier,
    pub successor: Identifier,
    pub finger_table: FingerTable,
    pub stored_items: BTreeMap<RingId, StoredItem>,
    pub phase: JoinPhase,
}

impl PeerState {
    pub fn set_predecessor(&mut self, predecessor: Identifier) {
        self.predecessor = predecessor;
    }

    /// A new successor also tightens the finger table.
    pub fn set_successor(&mut self, successor: Identifier) {
        self.finger_table.update_with_successor(&successor);
        self.successor = successor;
    }
}

/// Read-only copy of a peer's state, for the console and for tests.
#[derive(Clone, Debug, Serialize)]
pub struct PeerSnapshot {
    pub identifier: Identifier,
    pub predecessor: Identifier,
    pub successor: Identifier,
    pub finger_table: FingerTable,
    pub stored_items: Vec<StoredItem>,
    pub phase: JoinPhase,
}

/// One member of the ring.
///
/// The finger-table refresh and every inbound notification take the same lock, and no caller
/// holds it across network I/O.
pub struct Peer {
    identifier: Identifier,
    state: Mutex<PeerState>,
    max_hops: usize,
    span: Span,
}

impl Peer {
    pub fn new(
        identifier: Identifier,
        finger_table_size: usize,
        max_hops: usize,
        span: Span,
    ) -> Self {
        let state = PeerState {
            predecessor: identifier.clone(),
            successor: identifier.clone(),
            finger_table: FingerTable::new(finger_table_size, identifier.clone()),
            stored_items: BTreeMap::new(),
            phase: JoinPhase::Unjoined,
        };
        Self {
            identifier,
            state: Mutex::new(state),
            max_hops,
            span,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Logging handle every task working for this peer runs under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub async fn state(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().await
    }

    pub async fn predecessor(&self) -> Identifier {
        self.state.lock().await.predecessor.clone()
    }

    pub async fn successor(&self) -> Identifier {
        self.state.lock().await.successor.clone()
    }

    pub async fn finger_table(&self) -> FingerTable {
        self.state.lock().await.finger_table.clone()
    }

    pub async fn phase(&self) -> JoinPhase {
        self.state.lock().await.phase
    }

    pub async fn update_finger_table(&self, peer: &Identifier) -> usize {
        self.state.lock().await.finger_table.update_with_successor(peer)
    }

    pub async fn store_item(&self, item: StoredItem) {
        info!(key = %item.key, name = %item.name, bytes = item.len(), "storing item");
        self.state.lock().await.stored_items.insert(item.key, item);
    }

    pub async fn stored_item(&self, key: RingId) -> Option<StoredItem> {
        self.state.lock().await.stored_items.get(&key).cloned()
    }

    pub async fn snapshot(&self) -> PeerSnapshot {
        let state = self.state.lock().await;
        PeerSnapshot {
            identifier: self.identifier.clone(),
            predecessor: state.predecessor.clone(),
            successor: state.successor.clone(),
            finger_table: state.finger_table.clone(),
            stored_items: state.stored_items.values().cloned().collect(),
            phase: state.phase,
        }
    }

    async fn enter(&self, phase: JoinPhase) {
        info!(%phase, "join phase");
        self.state.lock().await.phase = phase;
    }

    /// Joins the ring through the rendezvous service.
    ///
    /// 1. Register our id; a collision is surfaced as [`ChordError::IdCollision`].
    /// 2. If the service hands us back ourselves we are the first member.
    /// 3. Otherwise ask the contact for our successor, then ask the successor for its
    ///    predecessor, which becomes ours.
    /// 4. Tell both neighbours about us, flood a join notification around the ring and fill the
    ///    finger table with explicit successor searches.
    /// 5. Tell the rendezvous service we made it.
    ///
    /// A failure after registration leaves whatever state was already changed in place.
    pub async fn join(
        &self,
        rendezvous: &dyn Rendezvous,
        transport: &dyn RingTransport,
    ) -> Result<(), ChordError> {
        self.join_inner(rendezvous, transport)
            .instrument(self.span.clone())
            .await
    }

    async fn join_inner(
        &self,
        rendezvous: &dyn Rendezvous,
        transport: &dyn RingTransport,
    ) -> Result<(), ChordError> {
        self.enter(JoinPhase::Registering).await;
        let registration = rendezvous
            .register(&self.identifier)
            .await
            .map_err(|e| ChordError::JoinFailed(format!("registration failed: {}", e)))?;

        if !registration.accepted {
            // TODO: pick a fresh id and register again once ids are no longer user supplied
            warn!(id = %self.identifier.id, "id already taken in the ring");
            self.enter(JoinPhase::Unjoined).await;
            return Err(ChordError::IdCollision(self.identifier.id.to_hex()));
        }

        if registration.contact == self.identifier {
            info!("first peer to join the ring");
        } else {
            info!(contact = ?registration.contact, "joining through existing peer");
            if let Err(e) = self.link_into_ring(&registration.contact, transport).await {
                error!(error = %e, "join abandoned");
                return Err(ChordError::JoinFailed(e.to_string()));
            }
        }

        rendezvous
            .announce_join(&self.identifier)
            .await
            .map_err(|e| ChordError::JoinFailed(format!("join announcement failed: {}", e)))?;
        self.enter(JoinPhase::Joined).await;

        let snapshot = self.snapshot().await;
        info!(
            predecessor = ?snapshot.predecessor,
            successor = ?snapshot.successor,
            "joined the ring"
        );
        Ok(())
    }

    async fn link_into_ring(
        &self,
        contact: &Identifier,
        transport: &dyn RingTransport,
    ) -> Result<(), NetworkError> {
        self.enter(JoinPhase::LocatingSuccessor).await;
        let successor = transport
            .find_successor(contact, self.identifier.id, &self.identifier)
            .await?;
        info!(successor = ?successor, "located successor");
        self.state.lock().await.set_successor(successor.clone());

        let predecessor = transport.get_predecessor(&successor).await?;
        info!(predecessor = ?predecessor, "located predecessor");
        {
            let mut state = self.state.lock().await;
            state.finger_table.update_with_successor(&predecessor);
            state.set_predecessor(predecessor.clone());
        }

        self.enter(JoinPhase::ExchangingNotifications).await;
        transport
            .notify_predecessor(&successor, &self.identifier)
            .await?;
        transport
            .notify_successor(&predecessor, &self.identifier)
            .await?;
        if successor != self.identifier {
            transport.announce_join(&successor, &self.identifier).await?;
        }

        self.enter(JoinPhase::RefreshingFingerTable).await;
        self.refresh_finger_table(transport).await
    }

    /// Resolves every finger whose position lies beyond our successor by asking the successor.
    pub async fn refresh_finger_table(
        &self,
        transport: &dyn RingTransport,
    ) -> Result<(), NetworkError> {
        let (successor, positions) = {
            let state = self.state.lock().await;
            let table = &state.finger_table;
            let positions: Vec<(usize, RingId)> = (0..table.len())
                .map(|index| (index, table.ring_position_of_index(index)))
                .filter(|(_, position)| {
                    !position.is_between(self.identifier.id, state.successor.id)
                })
                .collect();
            (state.successor.clone(), positions)
        };

        if successor == self.identifier {
            return Ok(());
        }

        for (index, position) in positions {
            let found = transport
                .find_successor(&successor, position, &self.identifier)
                .await?;
            self.state.lock().await.finger_table.set(index, found);
        }
        Ok(())
    }

    /// Leaves the ring. Only the rendezvous service is told; neighbours and stored items are
    /// left untouched.
    pub async fn leave(&self, rendezvous: &dyn Rendezvous) -> Result<(), DiscoveryError> {
        let result = rendezvous
            .announce_exit(&self.identifier)
            .instrument(self.span.clone())
            .await;
        if let Err(e) = &result {
            self.span
                .in_scope(|| error!(error = %e, "unable to send exit notification"));
        }
        self.state.lock().await.phase = JoinPhase::Left;
        result
    }
}
