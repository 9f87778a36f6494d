//! A point-in-time snapshot of pool and scheduler counters.

use serde::Serialize;

use crate::config::Config;

/// Top-level snapshot returned by [`Client::stats`](crate::client::Client::stats).
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub initialized: bool,
    pub pool: PoolStats,
    #[serde(rename = "executor")]
    pub scheduler: SchedulerStats,
    pub config: Config,
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct PoolStats {
    pub size: u32,
    pub in_use: u32,
    pub available: u32,
    pub created_total: u64,
    pub closed_total: u64,
    pub waiters: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct SchedulerStats {
    pub queue_size: usize,
    pub workers: usize,
    pub active_workers: usize,
    pub total_executed: u64,
    pub total_failed: u64,
    pub total_timed_out: u64,
}
