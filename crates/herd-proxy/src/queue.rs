use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::dispatcher::{ProxiedRequest, StoredResponse};
use crate::{CONTROL_CAPACITY, MAX_JOBS};

/// Capacity-one "done" latch shared by the sibling jobs of one fan-out:
/// the first worker to claim it publishes the answer, the rest drop their
/// responses.
#[derive(Debug, Clone, Default)]
pub struct WinnerLatch(Arc<AtomicBool>);

impl WinnerLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once across all clones.
    pub fn claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// One replicated write aimed at one backend. The `answer` sender and the
/// latch are shared with every sibling targeting the same client request.
pub struct QueueJob {
    pub request: Arc<ProxiedRequest>,
    pub answer: mpsc::Sender<StoredResponse>,
    pub winner: WinnerLatch,
}

/// Task tokens, one per queued job. The worker loop consumes these ahead
/// of control traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Deliver,
}

pub(crate) type AskReply = oneshot::Sender<()>;
pub(crate) type QuitAck = oneshot::Sender<()>;

/// The receiver halves a worker drains. Parked inside the queue while no
/// worker is running; taken at spawn and returned on clean exit, so at most
/// one worker per queue can exist.
pub(crate) struct WorkerChannels {
    pub jobs: mpsc::Receiver<QueueJob>,
    pub tasks: mpsc::Receiver<Task>,
    pub asks: mpsc::Receiver<AskReply>,
    pub quits: mpsc::Receiver<QuitAck>,
}

/// Control handle over a queue's worker: the liveness probe and the
/// cooperative stop. The probe is the only way to observe worker presence.
#[derive(Clone)]
pub struct WorkerCtl {
    ask_tx: mpsc::Sender<AskReply>,
    quit_tx: mpsc::Sender<QuitAck>,
}

impl WorkerCtl {
    /// Posts an ask carrying a fresh reply channel and waits for the reply.
    /// Dead when nothing answers within `timeout`; a late reply lands in a
    /// dropped receiver instead of lingering as a stale token.
    pub async fn probe(&self, timeout: Duration) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.ask_tx.try_send(reply_tx).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(timeout, reply_rx).await, Ok(Ok(())))
    }

    /// Probes the worker and, if alive, sends quit and awaits the single
    /// final acknowledgement. Returns whether a running worker was stopped.
    pub async fn stop(&self, timeout: Duration) -> bool {
        if !self.probe(timeout).await {
            return false;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.quit_tx.try_send(ack_tx).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(timeout, ack_rx).await, Ok(Ok(())))
    }
}

/// The per-backend FIFO of pending writes plus its worker control plane.
/// Identified by the backend's `host:port` endpoint.
pub struct Queue {
    id: String,
    jobs_tx: mpsc::Sender<QueueJob>,
    tasks_tx: mpsc::Sender<Task>,
    ctl: WorkerCtl,
    parked: StdMutex<Option<WorkerChannels>>,
}

impl Queue {
    fn new(id: &str) -> Arc<Queue> {
        let (jobs_tx, jobs) = mpsc::channel(MAX_JOBS);
        let (tasks_tx, tasks) = mpsc::channel(MAX_JOBS);
        let (ask_tx, asks) = mpsc::channel(CONTROL_CAPACITY);
        let (quit_tx, quits) = mpsc::channel(1);
        Arc::new(Queue {
            id: id.to_string(),
            jobs_tx,
            tasks_tx,
            ctl: WorkerCtl { ask_tx, quit_tx },
            parked: StdMutex::new(Some(WorkerChannels {
                jobs,
                tasks,
                asks,
                quits,
            })),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ctl(&self) -> &WorkerCtl {
        &self.ctl
    }

    /// Enqueues the job and its task token. Jobs delivered to one backend
    /// keep their enqueue order.
    pub async fn submit(&self, job: QueueJob) -> bool {
        if self.jobs_tx.send(job).await.is_err() {
            return false;
        }
        self.tasks_tx.send(Task::Deliver).await.is_ok()
    }

    /// Number of jobs waiting for delivery.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.jobs_tx.max_capacity() - self.jobs_tx.capacity()
    }

    /// Puts a task token back so the next worker picks up the job the
    /// current one left on the queue.
    pub(crate) fn resubmit_task(&self) {
        let _ = self.tasks_tx.try_send(Task::Deliver);
    }

    pub(crate) fn take_channels(&self) -> Option<WorkerChannels> {
        self.parked.lock().unwrap().take()
    }

    pub(crate) fn park_channels(&self, channels: WorkerChannels) {
        *self.parked.lock().unwrap() = Some(channels);
    }
}

/// All queues, keyed by backend endpoint. Every operation holds the single
/// registry lock covering the map.
pub struct QueueRegistry {
    records: Mutex<HashMap<String, Arc<Queue>>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the queue for `id`, creating it on first touch. The flag
    /// reports whether the queue already existed.
    pub async fn check(&self, id: &str) -> (Arc<Queue>, bool) {
        let mut records = self.records.lock().await;
        if let Some(queue) = records.get(id) {
            return (queue.clone(), true);
        }
        let queue = Queue::new(id);
        records.insert(id.to_string(), queue.clone());
        (queue, false)
    }

    /// Worker-stop handshake, then deletes the entry.
    pub async fn remove(&self, id: &str, timeout: Duration) {
        let mut records = self.records.lock().await;
        if let Some(queue) = records.remove(id) {
            queue.ctl().stop(timeout).await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Stops every worker and drops all queues; used by graceful shutdown.
    pub async fn shutdown(&self, timeout: Duration) {
        let mut records = self.records.lock().await;
        for (_, queue) in records.drain() {
            queue.ctl().stop(timeout).await;
        }
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
