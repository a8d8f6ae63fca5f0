//! Outbound gossip
//!
//! One ordered queue and one worker task per peer. A message is retried
//! with exponential backoff until the peer accepts it, and the next message
//! for that peer waits behind it, so each peer observes ops in commit
//! order. Peers that join late are backfilled from the author's journal,
//! read on demand; the publisher keeps no copy of past messages.

use super::network::{PeerId, Transport};
use super::{DhtOp, GossipMessage};
use crate::error::CoreError;
use crate::types::DnaAddress;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

/// Retry schedule for undeliverable messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl GossipConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.max(1))
    }

    /// Delay after `current`, capped at `max_backoff_ms`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        let next = current.as_secs_f64() * factor;
        let cap = Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms).max(1));
        Duration::from_secs_f64(next).min(cap)
    }
}

/// Delivery statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Messages queued and not yet accepted by their peer
    pub pending: usize,
    pub delivered: usize,
    /// Failed delivery attempts
    pub retries: usize,
}

struct PeerQueue {
    sender: mpsc::UnboundedSender<GossipMessage>,
    handle: JoinHandle<()>,
}

/// Per-instance publisher
pub struct Publisher {
    origin: PeerId,
    dna: DnaAddress,
    transport: Arc<dyn Transport>,
    config: GossipConfig,
    runtime: Handle,
    peers: Mutex<HashMap<PeerId, PeerQueue>>,
    running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<PublisherStats>>,
}

impl Publisher {
    pub fn new(
        origin: PeerId,
        dna: DnaAddress,
        transport: Arc<dyn Transport>,
        config: GossipConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            origin,
            dna,
            transport,
            config,
            runtime,
            peers: Mutex::new(HashMap::new()),
            running: Arc::new(RwLock::new(true)),
            stats: Arc::new(RwLock::new(PublisherStats::default())),
        }
    }

    /// Queue an op for every connected peer
    pub fn publish(&self, op: DhtOp) {
        if !*self.running.read() {
            return;
        }
        let message = GossipMessage {
            dna: self.dna.clone(),
            from: self.origin.clone(),
            op,
        };
        debug!(
            origin = %self.origin,
            op = message.op.kind(),
            entry = %message.op.header().entry_address,
            "Publishing op"
        );

        for (peer, queue) in self.peers.lock().iter() {
            self.enqueue(peer, queue, message.clone());
        }
    }

    /// Start queues for peers that joined since the last sync. `backlog`
    /// is read only when there is a new peer, and each new peer receives it
    /// before anything published afterwards.
    ///
    /// The caller must keep new commits out until this returns, or an op
    /// committed after the backlog read could miss the new peers.
    pub fn sync_peers<F>(&self, backlog: F) -> Result<usize, CoreError>
    where
        F: FnOnce() -> Result<Vec<DhtOp>, CoreError>,
    {
        if !*self.running.read() {
            return Ok(0);
        }
        let mut peers = self.peers.lock();
        let new_peers: Vec<PeerId> = self
            .transport
            .peers(&self.dna)
            .into_iter()
            .filter(|peer| peer != &self.origin && !peers.contains_key(peer))
            .collect();
        if new_peers.is_empty() {
            return Ok(0);
        }

        let messages: Vec<GossipMessage> = backlog()?
            .into_iter()
            .map(|op| GossipMessage {
                dna: self.dna.clone(),
                from: self.origin.clone(),
                op,
            })
            .collect();
        for peer in &new_peers {
            let queue = self.spawn_queue(peer);
            for message in &messages {
                self.enqueue(peer, &queue, message.clone());
            }
            debug!(
                origin = %self.origin,
                peer = %peer,
                backfill = messages.len(),
                "Connected peer queue"
            );
            peers.insert(peer.clone(), queue);
        }
        Ok(new_peers.len())
    }

    /// Abort all workers. Undelivered messages are dropped.
    pub fn stop(&self) {
        let mut running = self.running.write();
        if !*running {
            return;
        }
        *running = false;
        drop(running);

        for (_, queue) in self.peers.lock().drain() {
            queue.handle.abort();
        }
        self.stats.write().pending = 0;
        info!(origin = %self.origin, "Publisher stopped");
    }

    pub fn stats(&self) -> PublisherStats {
        self.stats.read().clone()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    fn enqueue(&self, peer: &PeerId, queue: &PeerQueue, message: GossipMessage) {
        if queue.sender.send(message).is_ok() {
            self.stats.write().pending += 1;
        } else {
            warn!(origin = %self.origin, peer = %peer, "Peer queue closed");
        }
    }

    fn spawn_queue(&self, peer: &PeerId) -> PeerQueue {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = self.runtime.spawn(Self::worker_loop(
            peer.clone(),
            receiver,
            Arc::clone(&self.transport),
            self.config.clone(),
            Arc::clone(&self.running),
            Arc::clone(&self.stats),
        ));
        PeerQueue { sender, handle }
    }

    async fn worker_loop(
        peer: PeerId,
        mut receiver: mpsc::UnboundedReceiver<GossipMessage>,
        transport: Arc<dyn Transport>,
        config: GossipConfig,
        running: Arc<RwLock<bool>>,
        stats: Arc<RwLock<PublisherStats>>,
    ) {
        while let Some(message) = receiver.recv().await {
            let mut delay = config.initial_backoff();
            let mut attempt = 0usize;
            loop {
                if !*running.read() {
                    return;
                }
                attempt += 1;
                match transport.deliver(&peer, message.clone()).await {
                    Ok(()) => {
                        let mut stats = stats.write();
                        stats.pending = stats.pending.saturating_sub(1);
                        stats.delivered += 1;
                        break;
                    }
                    Err(err) => {
                        stats.write().retries += 1;
                        debug!(
                            peer = %peer,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Delivery failed, backing off"
                        );
                        sleep(delay).await;
                        delay = config.next_backoff(delay);
                    }
                }
            }
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        for (_, queue) in self.peers.get_mut().drain() {
            queue.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use crate::entry::{ChainHeader, Entry};
    use crate::replication::InMemoryNetwork;
    use serde_json::json;

    fn op(content: &str) -> DhtOp {
        let entry = Entry::app("post", json!({ "content": content }));
        let header = ChainHeader::new(&entry, &AgentId::generate_fake("alice").address(), None);
        DhtOp::new(entry, header)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = GossipConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 35,
            backoff_factor: 2.0,
        };
        let first = config.initial_backoff();
        assert_eq!(first, Duration::from_millis(10));
        let second = config.next_backoff(first);
        assert_eq!(second, Duration::from_millis(20));
        assert_eq!(config.next_backoff(second), Duration::from_millis(35));
    }

    #[tokio::test]
    async fn test_ordered_delivery_with_backfill() {
        let network = Arc::new(InMemoryNetwork::new());
        let dna = DnaAddress::from("QmDna");
        let _own = network.join(&dna, "alice");
        let publisher = Publisher::new(
            "alice".to_string(),
            dna.clone(),
            network.clone(),
            GossipConfig::default(),
            Handle::current(),
        );
        // Not connected to anyone yet: only the backlog reaches bob
        publisher.publish(op("dropped"));

        let mut inbox = network.join(&dna, "bob");
        let connected = publisher
            .sync_peers(|| Ok(vec![op("first"), op("second")]))
            .unwrap();
        assert_eq!(connected, 1);
        publisher.publish(op("third"));
        assert_eq!(
            publisher
                .sync_peers(|| panic!("backlog read without a new peer"))
                .unwrap(),
            0
        );

        let mut received = Vec::new();
        for _ in 0..3 {
            let message = inbox.recv().await.unwrap();
            received.push(message.op.entry().app_value().unwrap()["content"].clone());
        }
        assert_eq!(received, vec![json!("first"), json!("second"), json!("third")]);
        assert_eq!(publisher.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_peer_reachable() {
        let network = Arc::new(InMemoryNetwork::new());
        let dna = DnaAddress::from("QmDna");
        let mut inbox = network.join(&dna, "bob");
        network.set_reachable(&dna, "bob", false);

        let publisher = Publisher::new(
            "alice".to_string(),
            dna.clone(),
            network.clone(),
            GossipConfig {
                initial_backoff_ms: 5,
                max_backoff_ms: 20,
                backoff_factor: 2.0,
            },
            Handle::current(),
        );
        publisher.sync_peers(|| Ok(Vec::new())).unwrap();
        publisher.publish(op("late"));
        sleep(Duration::from_millis(60)).await;
        assert!(publisher.stats().retries > 0);
        assert_eq!(publisher.stats().delivered, 0);

        network.set_reachable(&dna, "bob", true);
        let message = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.op.entry().app_value().unwrap()["content"], json!("late"));
    }
}
