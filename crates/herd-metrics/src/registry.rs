use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::debug;

use crate::snapshot::{render_table, NodeMetrics};

/// Capacity of the metrics update channel.
const UPDATE_QUEUE_CAPACITY: usize = 100_000;

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Success,
    Failure,
    Queued,
}

/// Which counter column a request belongs to. PUT and POST share `Set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    Get,
    Set,
    Delete,
}

impl MethodClass {
    pub fn classify(method: &str) -> MethodClass {
        match method {
            "PUT" | "POST" => MethodClass::Set,
            "DELETE" => MethodClass::Delete,
            _ => MethodClass::Get,
        }
    }
}

#[derive(Debug)]
struct MetricsEvent {
    endpoint: String,
    kind: MetricKind,
    class: MethodClass,
}

/// Read side of the counters: snapshots and the text table.
pub struct MetricsRegistry {
    records: Arc<RwLock<HashMap<String, NodeMetrics>>>,
}

/// Cheap-to-clone producer handle. Events go through the bounded channel to
/// the single consumer; an overflowing channel drops the event rather than
/// stalling the proxy path.
#[derive(Clone)]
pub struct MetricsHandle {
    tx: mpsc::Sender<MetricsEvent>,
}

impl MetricsRegistry {
    /// Creates the registry and spawns the single consumer task that owns
    /// all mutation.
    pub fn start() -> (Arc<MetricsRegistry>, MetricsHandle) {
        let records: Arc<RwLock<HashMap<String, NodeMetrics>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel::<MetricsEvent>(UPDATE_QUEUE_CAPACITY);

        let consumer = records.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mut records = consumer.write().unwrap();
                records
                    .entry(event.endpoint)
                    .or_default()
                    .apply(event.kind, event.class);
            }
        });

        (Arc::new(MetricsRegistry { records }), MetricsHandle { tx })
    }

    pub fn snapshot(&self) -> HashMap<String, NodeMetrics> {
        self.records.read().unwrap().clone()
    }

    pub fn render_table(&self) -> String {
        render_table(&self.records.read().unwrap())
    }
}

impl MetricsHandle {
    pub fn record(&self, endpoint: &str, kind: MetricKind, class: MethodClass) {
        let event = MetricsEvent {
            endpoint: endpoint.to_string(),
            kind,
            class,
        };
        if self.tx.try_send(event).is_err() {
            debug!("metrics channel full, dropping event for {}", endpoint);
        }
    }
}
