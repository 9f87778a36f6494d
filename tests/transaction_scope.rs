//! `TransactionScope` invariants: one pinned connection, rollback on error,
//! commit visibility (spec §8 invariant 5, scenarios S2/S3).

mod support;

use std::time::Duration;

use websqlite3::{Client, Error, Priority};

/// A stand-in for whatever error a caller's own logic raised mid-transaction;
/// `rollback_with` is generic over the cause and simply hands it back.
#[derive(Debug, PartialEq)]
struct CallerError(&'static str);

#[tokio::test]
async fn commit_makes_inserted_rows_visible() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(1, 2)).await?;
    client
        .execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT)",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;

    let mut txn = client.transaction().await?;
    txn.execute(
        "INSERT INTO widgets (name) VALUES (?1)",
        vec!["sprocket".into()],
    )
    .await?;
    txn.commit().await?;

    let rows = client
        .fetchall("SELECT name FROM widgets", vec![], Priority::Normal, None)
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name").unwrap().as_str(), Some("sprocket"));

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn scope_dropped_without_commit_rolls_back() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(1, 2)).await?;
    client
        .execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT)",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;

    {
        let mut txn = client.transaction().await?;
        txn.execute(
            "INSERT INTO widgets (name) VALUES (?1)",
            vec!["orphan".into()],
        )
        .await?;
        // `txn` goes out of scope here without `commit`/`rollback`.
    }

    let rows = client
        .fetchall("SELECT name FROM widgets", vec![], Priority::Normal, None)
        .await?;
    assert!(rows.is_empty(), "uncommitted insert must not be visible");

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn explicit_rollback_discards_the_insert_and_resurfaces_the_error() -> anyhow::Result<()> {
    let client = Client::connect(support::memory_config(1, 2)).await?;
    client
        .execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT)",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;

    let mut txn = client.transaction().await?;
    txn.execute(
        "INSERT INTO widgets (name) VALUES (?1)",
        vec!["doomed".into()],
    )
    .await?;

    let resurfaced = txn.rollback_with(CallerError("insert violated a business rule")).await;
    assert_eq!(resurfaced, CallerError("insert violated a business rule"));

    let rows = client
        .fetchall("SELECT name FROM widgets", vec![], Priority::Normal, None)
        .await?;
    assert!(rows.is_empty());

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn single_connection_transaction_exhausts_the_pool() -> anyhow::Result<()> {
    let client = Client::connect(support::single_connection_config_with_timeout(0.1)).await?;
    client
        .execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY)",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;

    let txn = client.transaction().await?;

    let started = tokio::time::Instant::now();
    let result = client.execute("SELECT 1", vec![], Priority::Normal, None).await;
    assert!(matches!(result, Err(Error::PoolExhausted(_))));
    assert!(started.elapsed() >= Duration::from_millis(90));

    txn.commit().await?;
    client.close().await;
    Ok(())
}

