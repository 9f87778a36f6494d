//! Error taxonomy for websqlite3.
//!
//! Every fallible operation in this crate resolves to one of the kinds below.
//! Nothing is retried inside the crate; retry policy is a caller concern.

use std::time::Duration;

/// A specialized `Result` type for websqlite3.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents every way an operation against the pool, scheduler, or a
/// transaction scope can fail.
///
/// This is the crate's single error type; there is no separate "base" marker
/// type the way a dynamically typed host language might use, since every
/// variant already unifies under one `enum` and one `std::error::Error` impl.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A new connection could not be opened by the driver.
    #[error("could not open a new connection: {0}")]
    Connection(#[source] rusqlite::Error),

    /// `connection_timeout` elapsed before a connection became available.
    #[error("pool exhausted: no connection became available within {0:?}")]
    PoolExhausted(Duration),

    /// The driver raised a SQL-level error while running a request.
    #[error("query failed: {0}")]
    Query(#[source] rusqlite::Error),

    /// `BEGIN`/`COMMIT`/`ROLLBACK` failed, or the client was used before
    /// `connect()`/after `close()`.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A deadline (queue wait, pool acquisition, or driver execution) was
    /// exceeded before the request completed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The pool or scheduler has been shut down.
    #[error("client is shut down")]
    Shutdown,

    /// A background worker thread crashed or its channel was dropped.
    #[error("a background worker crashed")]
    WorkerCrashed,
}

impl Error {
    /// Returns `true` if the underlying driver reported that the connection
    /// is no longer usable (as opposed to a plain SQL error on an otherwise
    /// healthy connection).
    pub(crate) fn is_connection_fatal(&self) -> bool {
        use rusqlite::ffi::ErrorCode;

        match self {
            Error::Connection(_) => true,
            Error::WorkerCrashed => true,
            Error::Query(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseCorrupt
                    | ErrorCode::DiskFull
                    | ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::InternalMalfunction
            ),
            _ => false,
        }
    }
}
