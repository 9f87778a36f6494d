//! The unit of work submitted to the [`Scheduler`](crate::scheduler::Scheduler).

use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::priority::Priority;
use crate::sqlite::Outcome;
use crate::value::Value;

/// What a [`Request`] asks a Connection to do.
///
/// `Begin`/`Commit`/`Rollback` are never placed on the
/// [`PriorityQueue`](crate::queue::PriorityQueue) — they run directly on a
/// pinned Connection from a `TransactionScope` or `Client::connection()`
/// handle — but share this enum because the driver bridge dispatches on it
/// either way. `Raw` can go either way: `Client::raw` queues it like
/// `Execute`, while a pinned handle can also run it directly.
#[derive(Debug)]
pub(crate) enum RequestKind {
    Execute { sql: String, params: Vec<Value> },
    ExecuteMany {
        sql: String,
        param_sets: Vec<Vec<Value>>,
    },
    FetchOne { sql: String, params: Vec<Value> },
    FetchAll { sql: String, params: Vec<Value> },
    Raw { sql: String },
    Begin { sql: &'static str },
    Commit,
    Rollback,
}

/// An absolute point in time past which a [`Request`] must fail with
/// `TimeoutError`, or "no deadline" if the caller passed no timeout.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn from_timeout(timeout: Option<Duration>) -> Self {
        Deadline(timeout.map(|d| Instant::now() + d))
    }

    pub(crate) fn is_expired(&self) -> bool {
        matches!(self.0, Some(at) if at <= Instant::now())
    }

    /// Time left before the deadline, or `None` if there is no deadline.
    /// `Err(Error::Timeout)` is returned when the deadline has already
    /// passed.
    pub(crate) fn remaining(&self) -> Result<Option<Duration>> {
        match self.0 {
            None => Ok(None),
            Some(at) => at
                .checked_duration_since(Instant::now())
                .map(Some)
                .ok_or(Error::Timeout(Duration::ZERO)),
        }
    }
}

/// One unit of work pending on the scheduler's priority queue.
#[derive(Debug)]
pub(crate) struct Request {
    pub(crate) seq: u64,
    pub(crate) priority: Priority,
    pub(crate) kind: RequestKind,
    pub(crate) deadline: Deadline,
    pub(crate) reply: oneshot::Sender<Result<Outcome>>,
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Request {}

impl PartialOrd for Request {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Request {
    /// Orders by priority first (higher first), then by `seq` ascending so
    /// that `BinaryHeap`, which is a max-heap, pops the request that should
    /// run next: highest priority, then earliest submission.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
