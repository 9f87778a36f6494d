//! Opens an in-memory database, runs a couple of statements at different
//! priorities, and demonstrates a committed and a rolled-back transaction.

use websqlite3::{Client, Config, Error, Priority};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_json_str(
        r#"{
            "connection": {
                "database": "file:websqlite3-demo?mode=memory&cache=shared",
                "uri": true
            },
            "pool": { "min_size": 1, "max_size": 4 }
        }"#,
    )?;
    let client = Client::connect(config).await?;

    client
        .execute(
            "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            vec![],
            Priority::Normal,
            None,
        )
        .await?;

    client
        .execute(
            "INSERT INTO widgets (name) VALUES (?1)",
            vec!["left-handed smoke shifter".into()],
            Priority::High,
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

    {
        let mut txn = client.transaction().await?;
        txn.execute(
            "INSERT INTO widgets (name) VALUES (?1)",
            vec!["doomed".into()],
        )
        .await?;
        let err = txn
            .rollback_with(Error::Transaction("caller rejected the batch".into()))
            .await;
        println!("rolled back: {err}");
    }

    let rows = client
        .fetchall("SELECT id, name FROM widgets ORDER BY id", vec![], Priority::Normal, None)
        .await?;
    for row in &rows {
        println!(
            "{}: {}",
            row.get("id").and_then(|v| v.as_i64()).unwrap_or_default(),
            row.get("name").and_then(|v| v.as_str()).unwrap_or_default(),
        );
    }

    println!("{:#?}", client.stats());

    client.close().await;
    Ok(())
}
