//! SQLite backend for the Rapport social graph.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Because every call runs on that one
//! thread, each transition's read-check-write transaction is serialized with
//! every other.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
