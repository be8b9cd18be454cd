//! Graceful close waits for checked-out connections to come back before
//! tearing the pool down; terminate tears it down immediately and is
//! idempotent with close.

mod support;

use std::time::Duration;

use latticedb::error::Error;
use latticedb::create_async_client;
use support::{Fixture, FixtureConfig};

#[tokio::test]
async fn close_waits_for_outstanding_checkout_then_rejects_new_acquires() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = create_async_client(Some(&fixture.dsn("db")), Some(1)).await?;

    let guard = client.acquire().await?;
    let hold_for = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        guard.release().await.expect("release");
    });

    client.close().await;
    hold_for.await?;

    let err = client.acquire().await.expect_err("pool is closed");
    assert!(matches!(err, Error::PoolClosed));
    Ok(())
}

#[tokio::test]
async fn terminate_is_immediate_and_idempotent() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = create_async_client(Some(&fixture.dsn("db")), Some(2)).await?;

    let _guard = client.acquire().await?;
    client.terminate();
    assert!(client.is_closed());

    // Idempotent: a second terminate (or a close after terminate) is a no-op,
    // not a panic or a hang.
    client.terminate();
    client.close().await;

    let err = client.acquire().await.expect_err("pool is closed");
    assert!(matches!(err, Error::PoolClosed));
    Ok(())
}
