//! The blocking SQLite driver bridge.
//!
//! Everything under this module runs the real, blocking `rusqlite` driver on
//! a dedicated OS thread and exposes it to the rest of the crate as a set of
//! async methods on [`ConnectionWorker`]. No async code ever touches
//! `rusqlite` directly.

mod worker;

pub(crate) use worker::{ConnectionWorker, Outcome};
