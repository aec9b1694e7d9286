use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// One backend replica behind the proxy.
///
/// Identity is the `host:port` pair. `priority` orders read dispatch when
/// the by-priority policy is on: positive values are tried first in
/// ascending order, `0` is neutral, negative values come last with the ones
/// closest to zero first (`1,2,3,0,-1,-2,-3`). `active` controls whether the
/// node has a queue and a worker at all; `maintenance` suspends the worker
/// while the queue keeps accepting writes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub maintenance: bool,
}

impl Node {
    /// The `host:port` identity used for queues, metrics and dispatch.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// A record is valid when the host is a non-empty alphanumeric name and
    /// the port is non-zero.
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && is_alphanumeric(&self.host) && self.port != 0
    }
}

/// Accepts exactly the strings over `[0-9A-Za-z_.-]`.
pub fn is_alphanumeric(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// The priority total order, ascending = first to try.
///
/// Positive priorities precede zero, which precedes negative; within the
/// positive class smaller values come first, within the negative class
/// values closer to zero come first. Ties must be broken by insertion
/// order, so callers sort with a stable sort over an insertion-ordered
/// snapshot.
pub fn priority_order(a: &Node, b: &Node) -> Ordering {
    priority_rank(a.priority).cmp(&priority_rank(b.priority))
}

fn priority_rank(priority: i32) -> (u8, i64) {
    match priority {
        p if p > 0 => (0, i64::from(p)),
        0 => (1, 0),
        p => (2, -i64::from(p)),
    }
}

/// A partial node record as accepted by the admin PUT endpoints.
///
/// Absent fields keep the value of the record they are applied over; on a
/// fresh record that means the documented defaults (0 / false).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodePatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub priority: Option<i32>,
    pub active: Option<bool>,
    pub maintenance: Option<bool>,
}

impl NodePatch {
    /// Applies the patch over `node`, returning the merged record.
    pub fn apply(&self, mut node: Node) -> Node {
        if let Some(host) = &self.host {
            node.host = host.clone();
        }
        if let Some(port) = self.port {
            node.port = port;
        }
        if let Some(priority) = self.priority {
            node.priority = priority;
        }
        if let Some(active) = self.active {
            node.active = active;
        }
        if let Some(maintenance) = self.maintenance {
            node.maintenance = maintenance;
        }
        node
    }
}
