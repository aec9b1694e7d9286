//! Shared types for the herd replicating reverse proxy.
//!
//! This crate holds everything the engine, the admin API and the binary
//! agree on: the backend node record with its validation rules and priority
//! ordering, the configuration file structures, the error taxonomy, and the
//! authentication capability.

pub mod auth;
pub mod config;
pub mod error;
pub mod node;

pub use config::{ApiConfig, AuthConfig, Config, HealthCheck, QueryMode};
pub use error::{HerdError, Result};
pub use node::{is_alphanumeric, Node, NodePatch};
