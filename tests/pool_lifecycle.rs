//! Pool bookkeeping invariants and boundary behaviors (spec §8: invariant 1,
//! invariant 6, boundary behaviors for `min_size=0` and `timeout=0`, and
//! scenario S5).

mod support;

use std::time::Duration;

use websqlite3::{Client, Error, Priority};

#[tokio::test]
async fn size_equals_in_use_plus_available() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(2, 4)).await?;

    let stats = client.stats();
    assert_eq!(stats.pool.size, stats.pool.in_use + stats.pool.available);
    assert!(stats.pool.size >= 2 && stats.pool.size <= 4);

    let _conn = client.connection().await?;
    let stats = client.stats();
    assert_eq!(stats.pool.size, stats.pool.in_use + stats.pool.available);
    assert_eq!(stats.pool.in_use, 1);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn min_size_zero_permits_cold_start_on_first_acquire() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(0, 2)).await?;
    assert_eq!(client.stats().pool.size, 0);

    let row = client.fetchone("SELECT 1", vec![], Priority::Normal, None).await?;
    assert!(row.is_some());
    assert_eq!(client.stats().pool.size, 1);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn zero_timeout_fails_without_touching_the_pool() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(1, 1)).await?;
    let before = client.stats().pool.in_use;

    let result = client
        .execute(
            "SELECT 1",
            vec![],
            Priority::Normal,
            Some(Duration::from_secs(0)),
        )
        .await;
    assert!(matches!(result, Err(Error::Timeout(_))));
    assert_eq!(client.stats().pool.in_use, before);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn close_resolves_outstanding_requests_and_drains_the_pool() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(1, 1)).await?;
    client.close().await;

    let result = client.execute("SELECT 1", vec![], Priority::Normal, None).await;
    assert!(matches!(result, Err(Error::Shutdown)));

    let stats = client.stats();
    assert_eq!(stats.pool.size, 0);
    assert!(!stats.initialized);

    Ok(())
}

#[tokio::test]
async fn close_is_idempotent() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(1, 1)).await?;
    client.close().await;
    client.close().await;
    Ok(())
}

#[tokio::test]
async fn max_size_one_forces_full_serialization() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(1, 1)).await?;
    client
        .execute(
            "CREATE TABLE counters (id INTEGER PRIMARY KEY, n INTEGER)",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;
    client
        .execute(
            "INSERT INTO counters (id, n) VALUES (1, 0)",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;

    for _ in 0..20 {
        client
            .execute(
                "UPDATE counters SET n = n + 1 WHERE id = 1",
                vec![],
                Priority::Normal,
                None,
            )
            .await?;
    }

    let rows = client
        .fetchall("SELECT n FROM counters WHERE id = 1", vec![], Priority::Normal, None)
        .await?;
    assert_eq!(rows[0].get("n").unwrap().as_i64(), Some(20));
    assert_eq!(client.stats().pool.size, 1);

    client.close().await;
    Ok(())
}
