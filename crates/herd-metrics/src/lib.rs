//! Per-node request counters for the herd proxy.
//!
//! Every backend endpoint gets three tri-counters (`success`, `failure`,
//! `queued`, each split by GET/SET/DELETE). Counters are mutated only by a
//! single consumer task fed through a bounded update channel, so readers
//! never observe torn values; the registry exposes read-only snapshots and
//! a text-table rendering. The collector is an observer, never on the
//! critical path.

pub mod registry;
pub mod snapshot;

pub use registry::{MethodClass, MetricKind, MetricsHandle, MetricsRegistry};
pub use snapshot::{NodeMetrics, TriCounter};
