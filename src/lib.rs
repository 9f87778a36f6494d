//! `websqlite3` is a concurrent, priority-scheduled access layer in front of
//! a single embedded SQLite database.
//!
//! A bounded pool of reusable connections is wrapped by a priority-scheduled
//! [`Client`] that serializes submitted queries across a fixed set of
//! workers. Callers submit queries tagged with a [`Priority`] and an
//! optional timeout; the layer guarantees fair priority ordering, bounded
//! concurrency, safe transaction scoping, and explicit failure signaling.
//!
//! ```no_run
//! use websqlite3::{Client, Config, Priority};
//!
//! # async fn run() -> websqlite3::Result<()> {
//! let client = Client::from_path("config.yaml").await?;
//!
//! client
//!     .execute(
//!         "INSERT INTO widgets (name) VALUES (?1)",
//!         vec!["left-handed smoke shifter".into()],
//!         Priority::Normal,
//!         None,
//!     )
//!     .await?;
//!
//! let mut txn = client.transaction().await?;
//! txn.execute("UPDATE widgets SET name = ?1 WHERE id = ?2", vec!["x".into(), 1i64.into()])
//!     .await?;
//! txn.commit().await?;
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod error;
mod pool;
mod priority;
mod queue;
mod request;
mod row;
mod scheduler;
mod sqlite;
mod stats;
mod value;

pub use client::{Client, PinnedConnection, TransactionScope};
pub use config::{Config, ConnectionConfig, IsolationLevel, PoolConfig, ServerConfig};
pub use error::{Error, Result};
pub use priority::Priority;
pub use row::Row;
pub use stats::{PoolStats, SchedulerStats, Stats};
pub use value::Value;

use crate::sqlite::Outcome;

/// The outcome of an `execute`/`executemany` statement: how many rows it
/// touched, and (for `execute`) the last inserted row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    pub last_insert_rowid: i64,
}

impl ExecuteResult {
    pub(crate) fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Execute {
                rows_affected,
                last_insert_rowid,
            } => ExecuteResult {
                rows_affected,
                last_insert_rowid,
            },
            _ => unreachable!("execute request always yields Outcome::Execute"),
        }
    }
}
