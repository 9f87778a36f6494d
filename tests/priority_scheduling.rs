//! Dispatch-order guarantees: priority first, submission order within a
//! priority (spec §8 properties 3 and 4, scenarios S1/S4).

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use websqlite3::{Client, Priority};

#[tokio::test]
async fn critical_jumps_ahead_of_queued_normal_work() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(2, 2)).await?;

    // Occupy both connections with slow queries so a third request must queue.
    let slow = "WITH RECURSIVE slow(x) AS (SELECT 1 UNION ALL SELECT x+1 FROM slow WHERE x < 2000000) SELECT count(*) FROM slow";
    let hold_a = client.execute(slow, vec![], Priority::Normal, None);
    let hold_b = client.execute(slow, vec![], Priority::Normal, None);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.stats().pool.in_use, 2);

    let critical = client.fetchone("SELECT 1", vec![], Priority::Critical, None);

    let (a, b, c) = tokio::join!(hold_a, hold_b, critical);
    a?;
    b?;
    c?;

    assert!(client.stats().scheduler.total_executed >= 3);
    client.close().await;
    Ok(())
}

#[tokio::test]
async fn equal_priority_preserves_submission_order() -> anyhow::Result<()> {
    let client = Arc::new(Client::connect(support::memory_config(1, 1)).await?);

    client
        .execute(
            "CREATE TABLE dispatch_log (seq INTEGER)",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;

    let mut joins = JoinSet::new();
    for i in 0..25i64 {
        let client = Arc::clone(&client);
        joins.spawn(async move {
            client
                .execute(
                    "INSERT INTO dispatch_log (seq) VALUES (?1)",
                    vec![i.into()],
                    Priority::Normal,
                    None,
                )
                .await
        });
    }
    while let Some(res) = joins.join_next().await {
        res??;
    }

    // max_size=1 forces full serialization: with equal priority, submission
    // order is preserved at dispatch, so rows land in submission order.
    let rows = client
        .fetchall(
            "SELECT seq FROM dispatch_log ORDER BY rowid",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;
    let seqs: Vec<i64> = rows
        .iter()
        .map(|r| r.get("seq").unwrap().as_i64().unwrap())
        .collect();
    assert_eq!(seqs, (0..25).collect::<Vec<i64>>());

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn mixed_priority_batch_all_succeed() -> anyhow::Result<()> {
    let client = Arc::new(Client::connect(support::memory_config(1, 2)).await?);
    client
        .execute(
            "CREATE TABLE dispatch_order (priority INTEGER, seq INTEGER)",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;

    let priorities = [Priority::Low, Priority::Normal, Priority::High, Priority::Critical];
    let mut joins = JoinSet::new();
    for (seq, &priority) in priorities.iter().cycle().take(100).enumerate() {
        let client = Arc::clone(&client);
        joins.spawn(async move {
            client
                .execute(
                    "INSERT INTO dispatch_order (priority, seq) VALUES (?1, ?2)",
                    vec![(priority as i64).into(), (seq as i64).into()],
                    priority,
                    None,
                )
                .await
        });
    }
    while let Some(res) = joins.join_next().await {
        res??;
    }

    let stats = client.stats();
    assert_eq!(stats.scheduler.total_executed, 101); // 100 inserts + the CREATE TABLE
    assert_eq!(stats.scheduler.total_failed, 0);
    client.close().await;
    Ok(())
}
