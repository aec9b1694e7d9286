use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{error, info};

use herd_common::QueryMode;

use crate::inventory::NodeInventory;

/// Signals consumed by the coordinator task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Post one token on the server's response channel. Shutdown uses this
    /// as a flush: the token only appears after every job queued ahead of
    /// the signal has been applied.
    Response,
    /// Run the pending inventory transaction, then rebuild the ring.
    NodeJob,
}

/// The slice of the coordinator the inventory is allowed to see: policy
/// flags and job signalling. Injected at construction so the inventory
/// never holds the coordinator itself.
#[derive(Clone)]
pub struct CoordinatorHandle {
    job_tx: mpsc::Sender<Signal>,
    policy: QueryMode,
}

impl CoordinatorHandle {
    pub fn new(job_tx: mpsc::Sender<Signal>, policy: QueryMode) -> CoordinatorHandle {
        CoordinatorHandle { job_tx, policy }
    }

    pub async fn post_node_job(&self) {
        let _ = self.job_tx.send(Signal::NodeJob).await;
    }

    /// Asks the coordinator for one token on the server's response channel
    /// once the signals ahead of this one have drained.
    pub async fn post_response(&self) {
        let _ = self.job_tx.send(Signal::Response).await;
    }

    pub fn policy(&self) -> QueryMode {
        self.policy
    }
}

/// The single task that serialises inventory mutations and ring rebuilds,
/// and participates in graceful shutdown.
pub(crate) struct Coordinator {
    job_rx: mpsc::Receiver<Signal>,
    quit_rx: mpsc::Receiver<()>,
    response_tx: mpsc::Sender<()>,
    inventory: Arc<NodeInventory>,
}

impl Coordinator {
    pub(crate) fn spawn(
        job_rx: mpsc::Receiver<Signal>,
        quit_rx: mpsc::Receiver<()>,
        response_tx: mpsc::Sender<()>,
        inventory: Arc<NodeInventory>,
    ) {
        tokio::spawn(supervise(Coordinator {
            job_rx,
            quit_rx,
            response_tx,
            inventory,
        }));
    }

    /// Biased select: pending jobs drain before quit is honoured.
    async fn run(&mut self) {
        loop {
            tokio::select! {
                biased;
                signal = self.job_rx.recv() => match signal {
                    Some(signal) => self.handle(signal).await,
                    None => return,
                },
                _ = self.quit_rx.recv() => return,
            }
        }
    }

    async fn handle(&self, signal: Signal) {
        match signal {
            Signal::NodeJob => {
                self.inventory.apply_transaction().await;
                self.inventory.init_ring().await;
            }
            Signal::Response => {
                let _ = self.response_tx.try_send(());
            }
        }
    }
}

/// Restart policy: a panicking coordinator is respawned; the clean exit
/// posts the final response token the shutdown path waits on.
async fn supervise(mut coordinator: Coordinator) {
    loop {
        let outcome = AssertUnwindSafe(coordinator.run()).catch_unwind().await;
        match outcome {
            Ok(()) => {
                info!("coordinator stopped");
                let _ = coordinator.response_tx.try_send(());
                return;
            }
            Err(_) => error!("coordinator panicked, restarting"),
        }
    }
}
