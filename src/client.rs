//! The façade that composes [`Pool`], [`Scheduler`], and [`TransactionScope`]
//! into the crate's public entry point.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::priority::Priority;
use crate::request::RequestKind;
use crate::scheduler::Scheduler;
use crate::sqlite::Outcome;
use crate::stats::Stats;
use crate::value::Value;
use crate::{ExecuteResult, Row};

/// Logs `sql` at `debug` when `pool.echo` is set. Shared by `Client`'s own
/// scheduler-bound dispatch and by `TransactionScope`/`PinnedConnection`,
/// which run directly on a pinned connection instead.
fn maybe_echo(echo: bool, sql: &str) {
    if echo {
        tracing::debug!(sql, "dispatching query");
    }
}

/// A concurrent, priority-scheduled handle onto a single SQLite database.
///
/// `Client` is not a singleton — an application may hold several, e.g. one
/// per database file, with no shared global state between them.
pub struct Client {
    config: Arc<Config>,
    pool: Arc<Pool>,
    scheduler: Arc<Scheduler>,
    closed: AtomicBool,
}

impl Client {
    /// Opens a pool to `pool.min_size` and starts the scheduler's workers.
    ///
    /// `connect()` is the crate's sole entry point: there is no separate
    /// "build, then connect" step.
    pub async fn connect(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let pool = Arc::new(Pool::new(Arc::clone(&config)).await?);
        let worker_count = config.pool.max_size as usize;
        let scheduler = Scheduler::start(Arc::clone(&pool), worker_count);

        Ok(Client {
            config,
            pool,
            scheduler,
            closed: AtomicBool::new(false),
        })
    }

    /// Loads a [`Config`] from disk, then [`connect`](Self::connect)s.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(Config::from_path(path)?).await
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    fn maybe_echo(&self, sql: &str) {
        maybe_echo(self.config.pool.echo, sql);
    }

    /// `check_open` is only a fast path that skips building a `Request` for
    /// a `Client` that was already closed when this call started — it races
    /// harmlessly with a concurrent `close()`. Correctness of "submitting
    /// after close() fails with Shutdown" does not depend on it: the
    /// scheduler's queue rejects any request that loses that race on its
    /// own (see `PriorityQueue::push`).
    async fn submit(
        &self,
        kind: RequestKind,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<Outcome> {
        self.check_open()?;
        self.scheduler.submit(kind, priority, timeout).await
    }

    /// Runs a single statement, returning the affected row count and last
    /// inserted row id.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<ExecuteResult> {
        let sql = sql.into();
        self.maybe_echo(&sql);
        let outcome = self
            .submit(RequestKind::Execute { sql, params }, priority, timeout)
            .await?;
        Ok(ExecuteResult::from_outcome(outcome))
    }

    /// Runs one statement once per parameter set, returning the total
    /// affected row count across all sets.
    pub async fn executemany(
        &self,
        sql: impl Into<String>,
        param_sets: Vec<Vec<Value>>,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<u64> {
        let sql = sql.into();
        self.maybe_echo(&sql);
        let outcome = self
            .submit(
                RequestKind::ExecuteMany { sql, param_sets },
                priority,
                timeout,
            )
            .await?;
        match outcome {
            Outcome::ExecuteMany { rows_affected } => Ok(rows_affected),
            _ => unreachable!("executemany request always yields Outcome::ExecuteMany"),
        }
    }

    /// Runs a query and returns at most one row.
    pub async fn fetchone(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<Option<Row>> {
        let sql = sql.into();
        self.maybe_echo(&sql);
        let outcome = self
            .submit(RequestKind::FetchOne { sql, params }, priority, timeout)
            .await?;
        match outcome {
            Outcome::FetchOne(row) => Ok(row),
            _ => unreachable!("fetchone request always yields Outcome::FetchOne"),
        }
    }

    /// Runs a query and returns every row, in driver order.
    pub async fn fetchall(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<Vec<Row>> {
        let sql = sql.into();
        self.maybe_echo(&sql);
        let outcome = self
            .submit(RequestKind::FetchAll { sql, params }, priority, timeout)
            .await?;
        match outcome {
            Outcome::FetchAll(rows) => Ok(rows),
            _ => unreachable!("fetchall request always yields Outcome::FetchAll"),
        }
    }

    /// Runs a raw, possibly multi-statement SQL batch through the scheduler
    /// without parameter binding, e.g. multi-statement DDL. Every statement
    /// in the string runs — unlike `execute`, this does not go through a
    /// single prepared statement, which would silently drop everything
    /// after the first. `rows_affected`/`last_insert_rowid` reflect only the
    /// last statement in the batch, per SQLite's own `sqlite3_changes`/
    /// `sqlite3_last_insert_rowid` semantics.
    pub async fn raw(
        &self,
        sql: impl Into<String>,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<ExecuteResult> {
        let sql = sql.into();
        self.maybe_echo(&sql);
        let outcome = self
            .submit(RequestKind::Raw { sql }, priority, timeout)
            .await?;
        Ok(ExecuteResult::from_outcome(outcome))
    }

    /// Begins a transaction, pinning one connection outside the scheduler
    /// for the scope's whole duration.
    ///
    /// Bypasses the priority queue entirely — a transaction must pin
    /// exactly one connection, which the scheduler's fan-out model cannot
    /// express — and acquires directly from the pool instead.
    pub async fn transaction(&self) -> Result<TransactionScope<'_>> {
        self.check_open()?;
        let conn = self.pool.acquire().await?;
        TransactionScope::begin(&self.pool, conn, &self.config).await
    }

    /// Acquires a raw pinned connection for advanced use, with the same
    /// scoped-release guarantees as [`transaction`](Self::transaction) but
    /// without `BEGIN`/`COMMIT` framing.
    pub async fn connection(&self) -> Result<PinnedConnection<'_>> {
        self.check_open()?;
        let conn = self.pool.acquire().await?;
        Ok(PinnedConnection {
            pool: &self.pool,
            conn: Some(conn),
        })
    }

    /// A point-in-time snapshot of pool and scheduler counters.
    pub fn stats(&self) -> Stats {
        Stats {
            initialized: !self.closed.load(Ordering::Acquire),
            pool: self.pool.stats(),
            scheduler: self.scheduler.stats(),
            config: (*self.config).clone(),
        }
    }

    /// Idempotent shutdown: refuses new submissions, drains the queue with
    /// `Shutdown`, stops the scheduler's workers, then closes every pooled
    /// connection.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.close().await;
        self.pool.close().await;
    }
}

/// A scoped acquisition pinning one connection between `BEGIN` and
/// `COMMIT`/`ROLLBACK`.
///
/// Statements issued through a `TransactionScope` run directly on the
/// pinned connection rather than being re-queued through the scheduler, so
/// their order is strict program order. The scope must not be shared
/// across concurrent tasks — it owns exactly one connection.
pub struct TransactionScope<'a> {
    pool: &'a Pool,
    conn: Option<crate::connection::Connection>,
}

impl<'a> TransactionScope<'a> {
    async fn begin(
        pool: &'a Pool,
        mut conn: crate::connection::Connection,
        config: &Config,
    ) -> Result<Self> {
        let sql = config.begin_sql();
        if let Err(e) = conn.run(RequestKind::Begin { sql }).await {
            pool.discard(conn);
            return Err(e);
        }
        Ok(TransactionScope {
            pool,
            conn: Some(conn),
        })
    }

    fn conn_mut(&mut self) -> &mut crate::connection::Connection {
        self.conn.as_mut().expect("BUG: TransactionScope used after commit/rollback")
    }

    pub async fn execute(
        &mut self,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<ExecuteResult> {
        let sql = sql.into();
        maybe_echo(self.pool.echo(), &sql);
        let outcome = self
            .conn_mut()
            .run(RequestKind::Execute { sql, params })
            .await?;
        Ok(ExecuteResult::from_outcome(outcome))
    }

    pub async fn executemany(
        &mut self,
        sql: impl Into<String>,
        param_sets: Vec<Vec<Value>>,
    ) -> Result<u64> {
        let sql = sql.into();
        maybe_echo(self.pool.echo(), &sql);
        let outcome = self
            .conn_mut()
            .run(RequestKind::ExecuteMany { sql, param_sets })
            .await?;
        match outcome {
            Outcome::ExecuteMany { rows_affected } => Ok(rows_affected),
            _ => unreachable!("executemany request always yields Outcome::ExecuteMany"),
        }
    }

    pub async fn fetchone(&mut self, sql: impl Into<String>, params: Vec<Value>) -> Result<Option<Row>> {
        let sql = sql.into();
        maybe_echo(self.pool.echo(), &sql);
        let outcome = self
            .conn_mut()
            .run(RequestKind::FetchOne { sql, params })
            .await?;
        match outcome {
            Outcome::FetchOne(row) => Ok(row),
            _ => unreachable!("fetchone request always yields Outcome::FetchOne"),
        }
    }

    pub async fn fetchall(&mut self, sql: impl Into<String>, params: Vec<Value>) -> Result<Vec<Row>> {
        let sql = sql.into();
        maybe_echo(self.pool.echo(), &sql);
        let outcome = self
            .conn_mut()
            .run(RequestKind::FetchAll { sql, params })
            .await?;
        match outcome {
            Outcome::FetchAll(rows) => Ok(rows),
            _ => unreachable!("fetchall request always yields Outcome::FetchAll"),
        }
    }

    /// Commits the transaction. On a `COMMIT` failure the connection is
    /// marked unhealthy and discarded rather than returned to the pool.
    pub async fn commit(mut self) -> Result<()> {
        let mut conn = self.conn.take().expect("BUG: commit called twice");
        let result = conn.run(RequestKind::Commit).await;
        self.finish(conn, result.is_ok());
        result.map(|_| ())
    }

    /// Rolls the transaction back. Always returns the original error the
    /// caller passes in, after issuing `ROLLBACK` on the pinned connection.
    pub async fn rollback_with<E>(mut self, cause: E) -> E {
        let mut conn = self.conn.take().expect("BUG: rollback called twice");
        let result = conn.run(RequestKind::Rollback).await;
        self.finish(conn, result.is_ok());
        cause
    }

    /// Rolls the transaction back with no original error to re-surface.
    pub async fn rollback(mut self) -> Result<()> {
        let mut conn = self.conn.take().expect("BUG: rollback called twice");
        let result = conn.run(RequestKind::Rollback).await;
        self.finish(conn, result.is_ok());
        result.map(|_| ())
    }

    fn finish(&self, conn: crate::connection::Connection, framing_ok: bool) {
        if framing_ok && conn.healthy {
            self.pool.release(conn);
        } else {
            self.pool.discard(conn);
        }
    }
}

impl<'a> Drop for TransactionScope<'a> {
    fn drop(&mut self) {
        // A scope dropped without an explicit commit/rollback (e.g. the
        // caller hit an early return with `?`) must not leave the
        // connection mid-transaction in the pool's idle set.
        if let Some(conn) = self.conn.take() {
            conn.abandon_transaction_and_release(self.pool);
        }
    }
}

/// A raw pinned connection, acquired outside the scheduler, with no
/// `BEGIN`/`COMMIT` framing of its own.
pub struct PinnedConnection<'a> {
    pool: &'a Pool,
    conn: Option<crate::connection::Connection>,
}

impl<'a> PinnedConnection<'a> {
    fn conn_mut(&mut self) -> &mut crate::connection::Connection {
        self.conn.as_mut().expect("BUG: PinnedConnection used after release")
    }

    pub async fn execute(&mut self, sql: impl Into<String>, params: Vec<Value>) -> Result<ExecuteResult> {
        let sql = sql.into();
        maybe_echo(self.pool.echo(), &sql);
        let outcome = self
            .conn_mut()
            .run(RequestKind::Execute { sql, params })
            .await?;
        Ok(ExecuteResult::from_outcome(outcome))
    }

    pub async fn executemany(&mut self, sql: impl Into<String>, param_sets: Vec<Vec<Value>>) -> Result<u64> {
        let sql = sql.into();
        maybe_echo(self.pool.echo(), &sql);
        let outcome = self
            .conn_mut()
            .run(RequestKind::ExecuteMany { sql, param_sets })
            .await?;
        match outcome {
            Outcome::ExecuteMany { rows_affected } => Ok(rows_affected),
            _ => unreachable!("executemany request always yields Outcome::ExecuteMany"),
        }
    }

    pub async fn fetchone(&mut self, sql: impl Into<String>, params: Vec<Value>) -> Result<Option<Row>> {
        let sql = sql.into();
        maybe_echo(self.pool.echo(), &sql);
        let outcome = self
            .conn_mut()
            .run(RequestKind::FetchOne { sql, params })
            .await?;
        match outcome {
            Outcome::FetchOne(row) => Ok(row),
            _ => unreachable!("fetchone request always yields Outcome::FetchOne"),
        }
    }

    pub async fn fetchall(&mut self, sql: impl Into<String>, params: Vec<Value>) -> Result<Vec<Row>> {
        let sql = sql.into();
        maybe_echo(self.pool.echo(), &sql);
        let outcome = self
            .conn_mut()
            .run(RequestKind::FetchAll { sql, params })
            .await?;
        match outcome {
            Outcome::FetchAll(rows) => Ok(rows),
            _ => unreachable!("fetchall request always yields Outcome::FetchAll"),
        }
    }
}

impl<'a> Drop for PinnedConnection<'a> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.healthy {
                self.pool.release(conn);
            } else {
                self.pool.discard(conn);
            }
        }
    }
}
