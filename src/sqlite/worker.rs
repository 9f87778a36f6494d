use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::row::{row_from_statement, Row};
use crate::value::Value;

/// Result of a single dispatched command, returned across the worker boundary.
#[derive(Debug)]
pub(crate) enum Outcome {
    Execute {
        rows_affected: u64,
        last_insert_rowid: i64,
    },
    ExecuteMany {
        rows_affected: u64,
    },
    FetchOne(Option<Row>),
    FetchAll(Vec<Row>),
    Unit,
}

enum Command {
    Execute {
        sql: Box<str>,
        params: Vec<Value>,
        tx: oneshot::Sender<Result<Outcome>>,
    },
    ExecuteMany {
        sql: Box<str>,
        param_sets: Vec<Vec<Value>>,
        tx: oneshot::Sender<Result<Outcome>>,
    },
    FetchOne {
        sql: Box<str>,
        params: Vec<Value>,
        tx: oneshot::Sender<Result<Outcome>>,
    },
    FetchAll {
        sql: Box<str>,
        params: Vec<Value>,
        tx: oneshot::Sender<Result<Outcome>>,
    },
    RawBatch {
        sql: Box<str>,
        tx: oneshot::Sender<Result<Outcome>>,
    },
    Begin {
        sql: &'static str,
        tx: rendezvous_oneshot::Sender<Result<()>>,
    },
    Commit {
        tx: rendezvous_oneshot::Sender<Result<()>>,
    },
    Rollback {
        tx: Option<rendezvous_oneshot::Sender<Result<()>>>,
    },
    Ping {
        tx: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        tx: oneshot::Sender<Result<()>>,
    },
}

/// A single pooled connection's dedicated worker thread.
///
/// `rusqlite::Connection` is not `Send` across an await point in the way this
/// crate needs, and every SQLite call is blocking by nature. Rather than
/// wrap the driver in an async mutex and risk a slow query stalling the whole
/// runtime, each connection gets its own OS thread; the async side talks to
/// it over a bounded channel and waits on a oneshot reply.
pub(crate) struct ConnectionWorker {
    command_tx: flume::Sender<Command>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl ConnectionWorker {
    pub(crate) async fn establish(
        path: String,
        uri: bool,
        busy_timeout: Duration,
        cached_statements: usize,
    ) -> Result<Self> {
        let (establish_tx, establish_rx) = oneshot::channel();

        let join_handle = thread::Builder::new()
            .name(format!("websqlite3-conn-{path}"))
            .spawn(move || {
                let conn = match open(&path, uri, busy_timeout, cached_statements) {
                    Ok(conn) => conn,
                    Err(e) => {
                        let _ = establish_tx.send(Err(Error::Connection(e)));
                        return;
                    }
                };

                let (command_tx, command_rx) = flume::bounded::<Command>(64);
                if establish_tx.send(Ok(command_tx)).is_err() {
                    return;
                }

                let mut conn = conn;
                let mut ignore_next_rollback = false;

                for cmd in command_rx {
                    match cmd {
                        Command::Execute { sql, params, tx } => {
                            let res = run_execute(&conn, &sql, &params);
                            let _ = tx.send(res);
                        }
                        Command::ExecuteMany {
                            sql,
                            param_sets,
                            tx,
                        } => {
                            let res = run_execute_many(&conn, &sql, &param_sets);
                            let _ = tx.send(res);
                        }
                        Command::FetchOne { sql, params, tx } => {
                            let res = run_fetch_one(&conn, &sql, &params);
                            let _ = tx.send(res);
                        }
                        Command::FetchAll { sql, params, tx } => {
                            let res = run_fetch_all(&conn, &sql, &params);
                            let _ = tx.send(res);
                        }
                        Command::RawBatch { sql, tx } => {
                            let res = run_raw_batch(&conn, &sql);
                            let _ = tx.send(res);
                        }
                        Command::Begin { sql, tx } => {
                            let res = conn
                                .execute_batch(sql)
                                .map_err(|e| Error::Transaction(e.to_string()));
                            let res_ok = res.is_ok();

                            if tx.blocking_send(res).is_err() && res_ok {
                                // Nobody is left to commit or roll this transaction back;
                                // unwind it now so the connection isn't left mid-transaction.
                                if let Err(error) = conn.execute_batch("ROLLBACK") {
                                    tracing::error!(%error, "failed to roll back orphaned transaction");
                                    break;
                                }
                            }
                        }
                        Command::Commit { tx } => {
                            let res = conn
                                .execute_batch("COMMIT")
                                .map_err(|e| Error::Transaction(e.to_string()));
                            let res_ok = res.is_ok();

                            if tx.blocking_send(res).is_err() && res_ok {
                                ignore_next_rollback = true;
                            }
                        }
                        Command::Rollback { tx } => {
                            if ignore_next_rollback && tx.is_none() {
                                ignore_next_rollback = false;
                                continue;
                            }

                            let res = conn
                                .execute_batch("ROLLBACK")
                                .map_err(|e| Error::Transaction(e.to_string()));
                            let res_ok = res.is_ok();

                            if let Some(tx) = tx {
                                if tx.blocking_send(res).is_err() && res_ok {
                                    ignore_next_rollback = true;
                                }
                            }
                        }
                        Command::Ping { tx } => {
                            let res = conn
                                .query_row("SELECT 1", [], |_| Ok(()))
                                .map_err(Error::Query);
                            let _ = tx.send(res);
                        }
                        Command::Shutdown { tx } => {
                            drop(conn);
                            let _ = tx.send(Ok(()));
                            return;
                        }
                    }
                }
            })
            .map_err(|_| Error::WorkerCrashed)?;

        let command_tx = establish_rx.await.map_err(|_| Error::WorkerCrashed)??;

        Ok(Self {
            command_tx,
            join_handle: Some(join_handle),
        })
    }

    pub(crate) async fn execute(&self, sql: String, params: Vec<Value>) -> Result<Outcome> {
        self.oneshot_cmd(|tx| Command::Execute {
            sql: sql.into(),
            params,
            tx,
        })
        .await?
    }

    pub(crate) async fn execute_many(
        &self,
        sql: String,
        param_sets: Vec<Vec<Value>>,
    ) -> Result<Outcome> {
        self.oneshot_cmd(|tx| Command::ExecuteMany {
            sql: sql.into(),
            param_sets,
            tx,
        })
        .await?
    }

    pub(crate) async fn fetch_one(&self, sql: String, params: Vec<Value>) -> Result<Outcome> {
        self.oneshot_cmd(|tx| Command::FetchOne {
            sql: sql.into(),
            params,
            tx,
        })
        .await?
    }

    pub(crate) async fn fetch_all(&self, sql: String, params: Vec<Value>) -> Result<Outcome> {
        self.oneshot_cmd(|tx| Command::FetchAll {
            sql: sql.into(),
            params,
            tx,
        })
        .await?
    }

    /// Runs a possibly multi-statement batch via `sqlite3_exec`-style
    /// execution rather than a single prepared statement, so every statement
    /// in the string actually runs rather than only the first (see
    /// [`run_raw_batch`]).
    pub(crate) async fn execute_batch(&self, sql: String) -> Result<Outcome> {
        self.oneshot_cmd(|tx| Command::RawBatch {
            sql: sql.into(),
            tx,
        })
        .await?
    }

    pub(crate) async fn begin(&self, sql: &'static str) -> Result<()> {
        self.oneshot_cmd_with_ack(|tx| Command::Begin { sql, tx })
            .await?
    }

    pub(crate) async fn commit(&self) -> Result<()> {
        self.oneshot_cmd_with_ack(|tx| Command::Commit { tx })
            .await?
    }

    pub(crate) async fn rollback(&self) -> Result<()> {
        self.oneshot_cmd_with_ack(|tx| Command::Rollback { tx: Some(tx) })
            .await?
    }

    /// Fire-and-forget rollback used when a transaction scope is dropped
    /// without an explicit commit or rollback.
    pub(crate) fn start_rollback(&self) {
        let _ = self.command_tx.send(Command::Rollback { tx: None });
    }

    pub(crate) async fn ping(&self) -> Result<()> {
        self.oneshot_cmd(|tx| Command::Ping { tx }).await?
    }

    async fn oneshot_cmd<F, T>(&self, command: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send_async(command(tx))
            .await
            .map_err(|_| Error::WorkerCrashed)?;
        rx.await.map_err(|_| Error::WorkerCrashed)
    }

    async fn oneshot_cmd_with_ack<F, T>(&self, command: F) -> Result<T>
    where
        F: FnOnce(rendezvous_oneshot::Sender<T>) -> Command,
    {
        let (tx, rx) = rendezvous_oneshot::channel();
        self.command_tx
            .send_async(command(tx))
            .await
            .map_err(|_| Error::WorkerCrashed)?;
        rx.recv().await.map_err(|_| Error::WorkerCrashed)
    }

    /// Ask the worker thread to close the connection and exit.
    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.join_handle.take() else {
            return Ok(());
        };

        let (tx, rx) = oneshot::channel();
        if self.command_tx.send(Command::Shutdown { tx }).is_err() {
            let _ = handle.join();
            return Err(Error::WorkerCrashed);
        }

        let res = rx.await.map_err(|_| Error::WorkerCrashed)?;
        let _ = handle.join();
        res
    }
}

fn open(
    path: &str,
    uri: bool,
    busy_timeout: Duration,
    cached_statements: usize,
) -> rusqlite::Result<rusqlite::Connection> {
    use rusqlite::OpenFlags;

    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if uri {
        flags |= OpenFlags::SQLITE_OPEN_URI;
    }

    let conn = rusqlite::Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.set_prepared_statement_cache_capacity(cached_statements);
    Ok(conn)
}

fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> rusqlite::Result<()> {
    for (idx, value) in params.iter().enumerate() {
        stmt.raw_bind_parameter(idx + 1, rusqlite::types::Value::from(value.clone()))?;
    }
    Ok(())
}

fn run_execute(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<Outcome> {
    let mut stmt = conn.prepare_cached(sql).map_err(Error::Query)?;
    bind_params(&mut stmt, params).map_err(Error::Query)?;
    let rows_affected = stmt.raw_execute().map_err(Error::Query)? as u64;

    Ok(Outcome::Execute {
        rows_affected,
        last_insert_rowid: conn.last_insert_rowid(),
    })
}

fn run_execute_many(
    conn: &rusqlite::Connection,
    sql: &str,
    param_sets: &[Vec<Value>],
) -> Result<Outcome> {
    let mut rows_affected = 0u64;
    for params in param_sets {
        match run_execute(conn, sql, params)? {
            Outcome::Execute { rows_affected: n, .. } => rows_affected += n,
            _ => unreachable!(),
        }
    }
    Ok(Outcome::ExecuteMany { rows_affected })
}

fn run_fetch_one(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<Outcome> {
    let mut stmt = conn.prepare_cached(sql).map_err(Error::Query)?;
    bind_params(&mut stmt, params).map_err(Error::Query)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let mut rows = stmt.raw_query();
    let row = match rows.next().map_err(Error::Query)? {
        Some(row) => Some(row_from_statement(row, &column_names).map_err(Error::Query)?),
        None => None,
    };
    Ok(Outcome::FetchOne(row))
}

fn run_fetch_all(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> Result<Outcome> {
    let mut stmt = conn.prepare_cached(sql).map_err(Error::Query)?;
    bind_params(&mut stmt, params).map_err(Error::Query)?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let mut out = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().map_err(Error::Query)? {
        out.push(row_from_statement(row, &column_names).map_err(Error::Query)?);
    }
    Ok(Outcome::FetchAll(out))
}

/// Runs `sql` as a batch via `sqlite3_exec` (`Connection::execute_batch`)
/// rather than through a single prepared statement.
///
/// `rusqlite::Connection::prepare`/`prepare_cached` wrap
/// `sqlite3_prepare_v2`, which only compiles the *first* statement of a
/// multi-statement string and silently discards the rest — no error, just a
/// partial no-op. A batch of semicolon-separated DDL (the documented use of
/// `Client::raw`) needs every statement to run, so this goes through
/// `execute_batch` instead.
fn run_raw_batch(conn: &rusqlite::Connection, sql: &str) -> Result<Outcome> {
    conn.execute_batch(sql).map_err(Error::Query)?;
    Ok(Outcome::Execute {
        rows_affected: conn.changes(),
        last_insert_rowid: conn.last_insert_rowid(),
    })
}

// A oneshot channel where send completes only after the receiver receives the value.
//
// Used for BEGIN/COMMIT/ROLLBACK acknowledgement so a cancelled caller doesn't leave
// the worker's transaction state out of sync with what the caller believes happened.
mod rendezvous_oneshot {
    use tokio::sync::oneshot;

    pub struct Canceled;

    pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
        let (inner_tx, inner_rx) = oneshot::channel();
        (Sender { inner: inner_tx }, Receiver { inner: inner_rx })
    }

    pub struct Sender<T> {
        inner: oneshot::Sender<(T, oneshot::Sender<()>)>,
    }

    impl<T> Sender<T> {
        pub fn blocking_send(self, value: T) -> Result<(), Canceled> {
            let (ack_tx, ack_rx) = oneshot::channel();
            self.inner.send((value, ack_tx)).map_err(|_| Canceled)?;
            ack_rx.blocking_recv().map_err(|_| Canceled)?;
            Ok(())
        }
    }

    pub struct Receiver<T> {
        inner: oneshot::Receiver<(T, oneshot::Sender<()>)>,
    }

    impl<T> Receiver<T> {
        pub async fn recv(self) -> Result<T, Canceled> {
            let (value, ack_tx) = self.inner.await.map_err(|_| Canceled)?;
            ack_tx.send(()).map_err(|_| Canceled)?;
            Ok(value)
        }
    }
}
