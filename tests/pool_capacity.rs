//! S1 (suggested capacity) and the round-trip property from the
//! testable-properties list: a client created with no explicit concurrency
//! adopts the server's `suggested_pool_concurrency`, and a single query
//! leaves `free_size == capacity` behind.

mod support;

use latticedb::create_async_client;
use support::{Fixture, FixtureConfig};

#[tokio::test]
async fn adopts_suggested_pool_concurrency() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig {
        suggested_pool_concurrency: Some(8),
        ..Default::default()
    })
    .await;

    let client = create_async_client(Some(&fixture.dsn("db")), None).await?;

    assert_eq!(client.capacity(), 8);
    assert_eq!(client.free_size().await, 8);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn explicit_concurrency_overrides_suggestion() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig {
        suggested_pool_concurrency: Some(8),
        ..Default::default()
    })
    .await;

    let client = create_async_client(Some(&fixture.dsn("db")), Some(2)).await?;

    assert_eq!(client.capacity(), 2);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn round_trip_leaves_pool_fully_free() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = create_async_client(Some(&fixture.dsn("db")), Some(4)).await?;

    client
        .transaction()
        .run(|tx| Box::pin(async move { tx.execute_query("SELECT 1").await }))
        .await?;

    assert_eq!(client.free_size().await, client.capacity());
    assert_eq!(fixture.counters.begins.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(fixture.counters.commits.load(std::sync::atomic::Ordering::SeqCst), 1);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn query_convenience_methods_are_symmetric() -> anyhow::Result<()> {
    // Fixes the distilled spec's REDESIGN FLAG: every convenience method
    // opens a scope, delegates, and releases the same way, not just most of
    // them.
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = create_async_client(Some(&fixture.dsn("db")), Some(1)).await?;

    client.query("SELECT 1").await?;
    client.query_single("SELECT 1").await?;
    client.execute("SELECT 1").await?;
    client.query_json("SELECT 1").await?;
    client.query_single_json("SELECT 1").await?;
    client.execute_json("SELECT 1").await?;

    assert_eq!(client.free_size().await, client.capacity());

    client.close().await;
    Ok(())
}
