use std::collections::HashMap;

use serde::Serialize;

use crate::registry::{MethodClass, MetricKind};

/// One counter per request class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TriCounter {
    pub get: u64,
    pub set: u64,
    pub delete: u64,
}

impl TriCounter {
    fn bump(&mut self, class: MethodClass) {
        match class {
            MethodClass::Get => self.get += 1,
            MethodClass::Set => self.set += 1,
            MethodClass::Delete => self.delete += 1,
        }
    }

    fn drop_one(&mut self, class: MethodClass) {
        match class {
            MethodClass::Get => self.get = self.get.saturating_sub(1),
            MethodClass::Set => self.set = self.set.saturating_sub(1),
            MethodClass::Delete => self.delete = self.delete.saturating_sub(1),
        }
    }
}

/// The counters kept for one backend endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeMetrics {
    pub success: TriCounter,
    pub failure: TriCounter,
    pub queued: TriCounter,
}

impl NodeMetrics {
    /// `queued` grows on enqueue; delivery completion moves the unit over
    /// to `success` or `failure`.
    pub(crate) fn apply(&mut self, kind: MetricKind, class: MethodClass) {
        match kind {
            MetricKind::Queued => self.queued.bump(class),
            MetricKind::Success => {
                self.queued.drop_one(class);
                self.success.bump(class);
            }
            MetricKind::Failure => {
                self.queued.drop_one(class);
                self.failure.bump(class);
            }
        }
    }
}

/// Renders the counters as a bordered text table keyed by endpoint, in
/// endpoint order.
pub fn render_table(records: &HashMap<String, NodeMetrics>) -> String {
    let mut endpoints: Vec<&String> = records.keys().collect();
    endpoints.sort();

    let mut out = String::new();
    for endpoint in endpoints {
        let metrics = &records[endpoint];
        out.push('\n');
        out.push_str(endpoint);
        out.push('\n');
        out.push_str(
            "+=======================================================================+\n",
        );
        out.push_str(
            "| REQUESTS        |       GET       |       SET       |      DELETE     |\n",
        );
        out.push_str(
            "+=======================================================================+\n",
        );
        push_row(&mut out, "SUCCESS", &metrics.success);
        push_row(&mut out, "FAILURE", &metrics.failure);
        push_row(&mut out, "QUEUED", &metrics.queued);
    }
    out
}

fn push_row(out: &mut String, label: &str, counter: &TriCounter) {
    out.push_str(&format!(
        "| {:<15} | {:>15} | {:>15} | {:>15} |\n",
        label, counter.get, counter.set, counter.delete
    ));
    out.push_str("+-----------------+-----------------+-----------------+-----------------+\n");
}
