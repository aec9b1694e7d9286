use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info};

use herd_metrics::{MethodClass, MetricKind, MetricsHandle};

use crate::dispatcher::dispatch_request;
use crate::health::HealthChecker;
use crate::queue::{Queue, QuitAck, Task, WorkerChannels};

/// Everything a worker needs besides its queue.
pub(crate) struct WorkerContext {
    pub health: Arc<HealthChecker>,
    pub metrics: MetricsHandle,
    pub client: reqwest::Client,
    pub retry_interval: Duration,
}

/// Spawns a supervised worker for the queue. A no-op when the queue's
/// channels are already held by a running worker.
pub(crate) fn spawn_worker(queue: Arc<Queue>, ctx: Arc<WorkerContext>) {
    let Some(channels) = queue.take_channels() else {
        return;
    };
    tokio::spawn(supervise(Worker {
        queue,
        channels,
        ctx,
    }));
}

struct Worker {
    queue: Arc<Queue>,
    channels: WorkerChannels,
    ctx: Arc<WorkerContext>,
}

enum Exit {
    /// Cooperative stop; carries the ack the stopper is waiting on.
    Quit(QuitAck),
    /// Every control sender is gone; the queue no longer exists.
    Orphaned,
}

/// Restart policy: a panicking worker re-enters its loop with its channels
/// intact; only a clean exit parks the channels and posts the final ack.
async fn supervise(mut worker: Worker) {
    info!("worker started for {}", worker.queue.id());
    loop {
        let outcome = AssertUnwindSafe(worker.run()).catch_unwind().await;
        match outcome {
            Ok(exit) => {
                let id = worker.queue.id().to_string();
                let Worker {
                    queue, channels, ..
                } = worker;
                queue.park_channels(channels);
                if let Exit::Quit(ack) = exit {
                    let _ = ack.send(());
                }
                info!("worker closed for {}", id);
                return;
            }
            Err(_) => {
                error!("worker for {} panicked, restarting", worker.queue.id());
            }
        }
    }
}

impl Worker {
    /// Biased select: pending task tokens always win over control traffic.
    async fn run(&mut self) -> Exit {
        loop {
            tokio::select! {
                biased;
                task = self.channels.tasks.recv() => match task {
                    Some(Task::Deliver) => {
                        if let Some(exit) = self.deliver_next().await {
                            return exit;
                        }
                    }
                    None => return Exit::Orphaned,
                },
                ask = self.channels.asks.recv() => match ask {
                    Some(reply) => {
                        let _ = reply.send(());
                    }
                    None => return Exit::Orphaned,
                },
                quit = self.channels.quits.recv() => match quit {
                    Some(ack) => return Exit::Quit(ack),
                    None => return Exit::Orphaned,
                },
            }
        }
    }

    /// Health-gates one delivery, then replays the job against the
    /// backend. While the backend is unhealthy the worker keeps answering
    /// liveness asks and can be quit; on quit the task token goes back so
    /// a future worker retries the job.
    async fn deliver_next(&mut self) -> Option<Exit> {
        loop {
            if self.ctx.health.check(self.queue.id()).await {
                break;
            }
            info!(
                "node {} is not ready for updates, retrying in {}s",
                self.queue.id(),
                self.ctx.retry_interval.as_secs()
            );
            let retry = tokio::time::sleep(self.ctx.retry_interval);
            tokio::pin!(retry);
            loop {
                tokio::select! {
                    _ = &mut retry => break,
                    ask = self.channels.asks.recv() => match ask {
                        Some(reply) => {
                            let _ = reply.send(());
                        }
                        None => return Some(Exit::Orphaned),
                    },
                    quit = self.channels.quits.recv() => match quit {
                        Some(ack) => {
                            self.queue.resubmit_task();
                            return Some(Exit::Quit(ack));
                        }
                        None => return Some(Exit::Orphaned),
                    },
                }
            }
        }

        // A task token is only posted after its job, so the queue head is
        // there when the backend turns healthy.
        let job = match self.channels.jobs.try_recv() {
            Ok(job) => job,
            Err(_) => return None,
        };

        let class = MethodClass::classify(job.request.method.as_str());
        match dispatch_request(&self.ctx.client, self.queue.id(), &job.request).await {
            Ok(response) => {
                if job.winner.claim() {
                    let _ = job.answer.try_send(response);
                }
                self.ctx
                    .metrics
                    .record(self.queue.id(), MetricKind::Success, class);
            }
            Err(err) => {
                error!("dispatch to {} failed: {}", self.queue.id(), err);
                self.ctx
                    .metrics
                    .record(self.queue.id(), MetricKind::Failure, class);
            }
        }
        None
    }
}
