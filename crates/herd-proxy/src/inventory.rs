use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::info;

use herd_common::node::priority_order;
use herd_common::Node;

use crate::coordinator::CoordinatorHandle;
use crate::queue::QueueRegistry;
use crate::worker::{spawn_worker, WorkerContext};
use crate::MAX_JOBS;

/// A single inventory mutation. A batch is a run of mutations closed by
/// `Commit`; the updater applies the whole batch under the write lock.
#[derive(Debug, Clone)]
pub enum NodeMutation {
    Update(Node),
    Delete { host: String, port: u16 },
    Commit,
}

/// A record plus its insertion sequence number. The sequence makes
/// snapshots deterministic so the stable priority sort breaks ties by
/// insertion order; upserts keep their original position.
struct StoredNode {
    node: Node,
    seq: u64,
}

struct InventoryState {
    records: HashMap<String, HashMap<u16, StoredNode>>,
    ring: Vec<Node>,
    cursor: usize,
    next_seq: u64,
}

/// The set of backend descriptors plus the round-robin ring derived from
/// them. Reads take consistent snapshots; every mutation goes through the
/// update channel and is applied by the coordinator-driven transaction.
pub struct NodeInventory {
    state: RwLock<InventoryState>,
    update_tx: mpsc::Sender<NodeMutation>,
    update_rx: Mutex<mpsc::Receiver<NodeMutation>>,
    coordinator: CoordinatorHandle,
    queues: Arc<QueueRegistry>,
    worker_ctx: Arc<WorkerContext>,
    response_timeout: Duration,
}

impl NodeInventory {
    pub(crate) fn new(
        coordinator: CoordinatorHandle,
        queues: Arc<QueueRegistry>,
        worker_ctx: Arc<WorkerContext>,
        response_timeout: Duration,
    ) -> NodeInventory {
        let (update_tx, update_rx) = mpsc::channel(MAX_JOBS);
        NodeInventory {
            state: RwLock::new(InventoryState {
                records: HashMap::new(),
                ring: Vec::new(),
                cursor: 0,
                next_seq: 0,
            }),
            update_tx,
            update_rx: Mutex::new(update_rx),
            coordinator,
            queues,
            worker_ctx,
            response_timeout,
        }
    }

    /// Snapshot read of one record.
    pub async fn get(&self, host: &str, port: u16) -> Option<Node> {
        let state = self.state.read().await;
        state
            .records
            .get(host)
            .and_then(|ports| ports.get(&port))
            .map(|stored| stored.node.clone())
    }

    /// Snapshot of all records, priority-sorted when that policy is on.
    pub async fn get_all(&self) -> (Vec<Node>, usize) {
        let state = self.state.read().await;
        let nodes = self.sorted(state.records.values().flat_map(|ports| ports.values()));
        let total = nodes.len();
        (nodes, total)
    }

    /// Snapshot of one host's records, priority-sorted when that policy is
    /// on.
    pub async fn get_all_by_host(&self, host: &str) -> (Vec<Node>, usize) {
        let state = self.state.read().await;
        let nodes = match state.records.get(host) {
            Some(ports) => self.sorted(ports.values()),
            None => Vec::new(),
        };
        let total = nodes.len();
        (nodes, total)
    }

    fn sorted<'a, I>(&self, stored: I) -> Vec<Node>
    where
        I: Iterator<Item = &'a StoredNode>,
    {
        let mut stored: Vec<&StoredNode> = stored.collect();
        stored.sort_by_key(|entry| entry.seq);
        let mut nodes: Vec<Node> = stored.into_iter().map(|entry| entry.node.clone()).collect();
        if self.coordinator.policy().by_priority {
            nodes.sort_by(priority_order);
        }
        nodes
    }

    /// Upserts one record; `false` when the record is invalid.
    pub async fn set(&self, node: Node) -> bool {
        if !node.is_valid() {
            return false;
        }
        self.submit(vec![NodeMutation::Update(node)]).await
    }

    /// Upserts a batch; the whole batch is rejected when any record is
    /// invalid.
    pub async fn set_all(&self, nodes: Vec<Node>) -> bool {
        if nodes.iter().any(|node| !node.is_valid()) {
            return false;
        }
        self.submit(nodes.into_iter().map(NodeMutation::Update).collect())
            .await
    }

    /// Deletes one record; `false` when nothing matches.
    pub async fn delete(&self, host: &str, port: u16) -> bool {
        if self.get(host, port).await.is_none() {
            return false;
        }
        self.submit(vec![NodeMutation::Delete {
            host: host.to_string(),
            port,
        }])
        .await
    }

    /// Deletes every record of one host; `false` when the host is unknown.
    pub async fn delete_all_by_host(&self, host: &str) -> bool {
        // The delete jobs are enqueued from a read-locked snapshot; the
        // updater consumes them later under the write lock, which is safe
        // only because the updater is strictly asynchronous to this send.
        let mutations = {
            let state = self.state.read().await;
            match state.records.get(host) {
                Some(ports) => ports
                    .keys()
                    .map(|port| NodeMutation::Delete {
                        host: host.to_string(),
                        port: *port,
                    })
                    .collect::<Vec<_>>(),
                None => return false,
            }
        };
        self.submit(mutations).await
    }

    /// Deletes every record.
    pub async fn delete_all(&self) {
        let mutations = {
            let state = self.state.read().await;
            state
                .records
                .iter()
                .flat_map(|(host, ports)| {
                    ports.keys().map(|port| NodeMutation::Delete {
                        host: host.clone(),
                        port: *port,
                    })
                })
                .collect::<Vec<_>>()
        };
        self.submit(mutations).await;
    }

    /// Queues the batch, closes it with `Commit` and signals the
    /// coordinator, which applies it atomically.
    pub async fn submit(&self, mutations: Vec<NodeMutation>) -> bool {
        for mutation in mutations {
            if self.update_tx.send(mutation).await.is_err() {
                return false;
            }
        }
        if self.update_tx.send(NodeMutation::Commit).await.is_err() {
            return false;
        }
        self.coordinator.post_node_job().await;
        true
    }

    /// Runs one updater transaction: drains mutations up to `Commit` while
    /// holding the write lock, keeping each record's queue and worker in
    /// sync. Called only from the coordinator.
    pub(crate) async fn apply_transaction(&self) {
        let mut state = self.state.write().await;
        let mut update_rx = self.update_rx.lock().await;
        while let Some(mutation) = update_rx.recv().await {
            match mutation {
                NodeMutation::Commit => break,
                NodeMutation::Delete { host, port } => {
                    self.apply_delete(&mut state, &host, port).await;
                }
                NodeMutation::Update(node) => {
                    if node.host.is_empty() || node.port == 0 {
                        continue;
                    }
                    self.apply_update(&mut state, node).await;
                }
            }
        }
    }

    async fn apply_delete(&self, state: &mut InventoryState, host: &str, port: u16) {
        let endpoint = format!("{host}:{port}");
        info!("delete node {}", endpoint);
        if let Some(ports) = state.records.get_mut(host) {
            ports.remove(&port);
            if ports.is_empty() {
                state.records.remove(host);
            }
        }
        self.queues.remove(&endpoint, self.response_timeout).await;
    }

    async fn apply_update(&self, state: &mut InventoryState, node: Node) {
        let endpoint = node.endpoint();
        info!("update node {}", endpoint);

        let seq = state.next_seq;
        let inserted = {
            let ports = state.records.entry(node.host.clone()).or_default();
            match ports.entry(node.port) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().node = node.clone();
                    false
                }
                Entry::Vacant(entry) => {
                    entry.insert(StoredNode {
                        node: node.clone(),
                        seq,
                    });
                    true
                }
            }
        };
        if inserted {
            state.next_seq += 1;
        }

        if node.active {
            let (queue, existed) = self.queues.check(&endpoint).await;
            if !existed {
                if !node.maintenance {
                    spawn_worker(queue, self.worker_ctx.clone());
                }
            } else if node.maintenance {
                // a maintenance node keeps its queue but loses its worker
                queue.ctl().stop(self.response_timeout).await;
            } else if !queue.ctl().probe(self.response_timeout).await {
                spawn_worker(queue, self.worker_ctx.clone());
            }
        } else {
            self.queues.remove(&endpoint, self.response_timeout).await;
        }
    }

    /// Rebuilds the ring from the current snapshot. Round-robin only, and
    /// only when more than one node exists; otherwise the ring is empty
    /// and reads fall back to the snapshot path. Serialised through the
    /// coordinator.
    pub(crate) async fn init_ring(&self) {
        if !self.coordinator.policy().round_robin {
            return;
        }
        let (nodes, total) = self.get_all().await;
        let mut state = self.state.write().await;
        if total > 1 {
            state.ring = nodes;
        } else {
            state.ring.clear();
        }
        state.cursor = 0;
    }

    pub async fn ring_len(&self) -> usize {
        self.state.read().await.ring.len()
    }

    /// Reads the node at the cursor without advancing.
    pub async fn current_from_ring(&self) -> Option<Node> {
        let state = self.state.read().await;
        state.ring.get(state.cursor).cloned()
    }

    /// Advances the cursor by one.
    pub async fn twist_ring(&self) {
        let mut state = self.state.write().await;
        if !state.ring.is_empty() {
            state.cursor = (state.cursor + 1) % state.ring.len();
        }
    }
}
