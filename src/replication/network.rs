//! Gossip transport
//!
//! [`Transport`] is the seam between the publisher and whatever carries
//! messages. [`InMemoryNetwork`] connects instances hosted in one process:
//! peers join a space keyed by DNA address and receive messages on an
//! unbounded channel. A peer can be marked unreachable, in which case
//! delivery fails and the sender retries.

use super::GossipMessage;
use crate::error::NetworkError;
use crate::types::DnaAddress;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Peer identifier: the instance id
pub type PeerId = String;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Peers currently joined to the space of `dna`
    fn peers(&self, dna: &DnaAddress) -> Vec<PeerId>;

    /// Deliver a message to one peer
    async fn deliver(&self, peer: &PeerId, message: GossipMessage) -> Result<(), NetworkError>;
}

struct PeerSlot {
    sender: mpsc::UnboundedSender<GossipMessage>,
    reachable: bool,
}

/// In-process network
#[derive(Default)]
pub struct InMemoryNetwork {
    spaces: RwLock<HashMap<DnaAddress, HashMap<PeerId, PeerSlot>>>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join (or rejoin) the space of `dna`, returning the peer's inbox.
    ///
    /// Rejoining replaces the previous inbox and marks the peer reachable.
    pub fn join(&self, dna: &DnaAddress, peer: &str) -> mpsc::UnboundedReceiver<GossipMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.spaces.write().entry(dna.clone()).or_default().insert(
            peer.to_string(),
            PeerSlot {
                sender,
                reachable: true,
            },
        );
        info!(dna = %dna, peer = %peer, "Peer joined");
        receiver
    }

    /// Mark a peer reachable or unreachable. Returns false for unknown peers.
    pub fn set_reachable(&self, dna: &DnaAddress, peer: &str, reachable: bool) -> bool {
        let mut spaces = self.spaces.write();
        match spaces.get_mut(dna).and_then(|space| space.get_mut(peer)) {
            Some(slot) => {
                slot.reachable = reachable;
                debug!(dna = %dna, peer = %peer, reachable, "Peer reachability changed");
                true
            }
            None => false,
        }
    }

    pub fn is_reachable(&self, dna: &DnaAddress, peer: &str) -> bool {
        self.spaces
            .read()
            .get(dna)
            .and_then(|space| space.get(peer))
            .map(|slot| slot.reachable)
            .unwrap_or(false)
    }

    fn lookup(&self, dna: &DnaAddress, peer: &str) -> Result<mpsc::UnboundedSender<GossipMessage>, NetworkError> {
        let spaces = self.spaces.read();
        let slot = spaces
            .get(dna)
            .and_then(|space| space.get(peer))
            .ok_or_else(|| NetworkError::UnknownPeer(peer.to_string()))?;
        if !slot.reachable {
            return Err(NetworkError::PeerUnreachable(peer.to_string()));
        }
        Ok(slot.sender.clone())
    }
}

#[async_trait]
impl Transport for InMemoryNetwork {
    fn peers(&self, dna: &DnaAddress) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .spaces
            .read()
            .get(dna)
            .map(|space| space.keys().cloned().collect())
            .unwrap_or_default();
        peers.sort();
        peers
    }

    async fn deliver(&self, peer: &PeerId, message: GossipMessage) -> Result<(), NetworkError> {
        let sender = self.lookup(&message.dna, peer)?;
        sender
            .send(message)
            .map_err(|_| NetworkError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use crate::entry::{ChainHeader, Entry};
    use crate::replication::DhtOp;

    fn message(dna: &DnaAddress) -> GossipMessage {
        let agent = AgentId::generate_fake("alice");
        let entry = Entry::AgentId(agent.clone());
        let header = ChainHeader::new(&entry, &agent.address(), None);
        GossipMessage {
            dna: dna.clone(),
            from: "alice::blog".to_string(),
            op: DhtOp::new(entry, header),
        }
    }

    #[tokio::test]
    async fn test_deliver_to_joined_peer() {
        let network = InMemoryNetwork::new();
        let dna = DnaAddress::from("QmDna");
        let mut inbox = network.join(&dna, "bob::blog");
        assert_eq!(network.peers(&dna), vec!["bob::blog".to_string()]);

        network
            .deliver(&"bob::blog".to_string(), message(&dna))
            .await
            .unwrap();
        assert!(inbox.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_and_unknown_peers() {
        let network = InMemoryNetwork::new();
        let dna = DnaAddress::from("QmDna");
        let _inbox = network.join(&dna, "bob::blog");
        assert!(network.set_reachable(&dna, "bob::blog", false));
        assert!(!network.is_reachable(&dna, "bob::blog"));

        let err = network
            .deliver(&"bob::blog".to_string(), message(&dna))
            .await
            .unwrap_err();
        assert_eq!(err, NetworkError::PeerUnreachable("bob::blog".to_string()));

        let err = network
            .deliver(&"carol::blog".to_string(), message(&dna))
            .await
            .unwrap_err();
        assert_eq!(err, NetworkError::UnknownPeer("carol::blog".to_string()));
    }

    #[tokio::test]
    async fn test_closed_inbox() {
        let network = InMemoryNetwork::new();
        let dna = DnaAddress::from("QmDna");
        drop(network.join(&dna, "bob::blog"));
        let err = network
            .deliver(&"bob::blog".to_string(), message(&dna))
            .await
            .unwrap_err();
        assert_eq!(err, NetworkError::ChannelClosed);
    }
}
