//! The herd proxy engine.
//!
//! A replicating HTTP reverse proxy front-ending a set of peer backends
//! that expose the same REST API. Reads go to one healthy backend picked by
//! the configured policy (round-robin ring or priority order); writes
//! (POST/PUT/DELETE) are replicated to every active backend through
//! per-node in-memory queues whose workers deliver with health-gated
//! retries, and the first successful backend response is returned to the
//! client.
//!
//! # Moving parts
//!
//! 1. **Inventory**: the node records plus the round-robin ring, mutated
//!    only through a serialised updater transaction.
//! 2. **Queues**: one FIFO of pending writes per active node, with a
//!    control handle (`WorkerCtl`) for liveness probing and cooperative
//!    stop.
//! 3. **Workers**: one per active, non-maintenance node; drain their
//!    queue once the backend's health probe passes, and are respawned by a
//!    supervisor if they panic.
//! 4. **Coordinator**: the single task that applies inventory batches,
//!    rebuilds the ring and synchronises graceful shutdown.
//! 5. **Dispatcher**: the front-end handler routing each request to one
//!    node (reads) or to every node via the queues (writes).

pub mod coordinator;
pub mod dispatcher;
pub mod health;
pub mod inventory;
pub mod queue;
pub mod server;
mod worker;

use std::time::Duration;

pub use coordinator::{CoordinatorHandle, Signal};
pub use dispatcher::{Dispatcher, ProxiedRequest, StoredResponse};
pub use health::HealthChecker;
pub use inventory::{NodeInventory, NodeMutation};
pub use queue::{Queue, QueueJob, QueueRegistry, WinnerLatch, WorkerCtl};
pub use server::ProxyServer;

/// Default upper bound for replication answers and worker liveness probes.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the coordinator's job-signal channel.
pub const MAX_SIGNALS: usize = 1000;

/// Capacity of the inventory update channel and of each queue's job and
/// task channels.
pub const MAX_JOBS: usize = 100_000;

/// Capacity of the per-queue ask channel and the server response channel.
pub const CONTROL_CAPACITY: usize = 100;
