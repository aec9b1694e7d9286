//! The herd admin API.
//!
//! REST endpoints that inspect and mutate the node inventory at runtime,
//! expose authentication operations, the per-node metrics table, runtime
//! info and the help text. Reads answer with a `{success, total, results}`
//! envelope, writes with `201 Created` on insertion and `202 Accepted` on
//! update; validation failures carry the documented error envelope. Every
//! response echoes a request `Origin` back for CORS, and `pretty=true`
//! switches to pretty-printed JSON.

pub mod envelope;
mod help;
mod info;
mod nodes;
pub mod server;
mod session;

pub use server::{AdminServer, AdminState};
