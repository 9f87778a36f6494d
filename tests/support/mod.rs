//! Shared test fixtures: in-memory configs and a tiny seeded schema.

use std::sync::atomic::{AtomicU64, Ordering};

use websqlite3::{Config, ConnectionConfig, PoolConfig, ServerConfig};

static SEQ: AtomicU64 = AtomicU64::new(0);

/// A config pointing at a private, process-unique shared-cache in-memory
/// database, so every pooled connection in the test sees the same data —
/// a plain `:memory:` filename gives each connection its own isolated
/// database, which would defeat tests that acquire more than once.
pub fn memory_config(min_size: u32, max_size: u32) -> Config {
    let seqno = SEQ.fetch_add(1, Ordering::Relaxed);
    Config {
        connection: ConnectionConfig {
            database: format!("file:websqlite3-test-{seqno}?mode=memory&cache=shared"),
            timeout: 5.0,
            check_same_thread: false,
            isolation_level: None,
            cached_statements: 128,
            uri: true,
        },
        pool: PoolConfig {
            min_size,
            max_size,
            max_queries: 0,
            max_idle_time: 600.0,
            connection_timeout: 5.0,
            pool_recycle: 0,
            echo: false,
        },
        server: ServerConfig::default(),
    }
}

pub fn single_connection_config() -> Config {
    memory_config(1, 1)
}

/// A single-connection config with a short `connection_timeout`, for tests
/// that need `PoolExhaustedError` to fire quickly.
pub fn single_connection_config_with_timeout(connection_timeout: f64) -> Config {
    let mut config = memory_config(1, 1);
    config.pool.connection_timeout = connection_timeout;
    config
}
