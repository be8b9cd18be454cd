//! S3 (cancellation shield) and the pool's core bookkeeping invariants:
//! free_size + in-use always equals capacity, and an aborted task still
//! returns its slot because `AcquireGuard::drop` releases synchronously by
//! spawning the actual release work.

mod support;

use std::time::Duration;

use latticedb::create_async_client;
use support::{Fixture, FixtureConfig};

#[tokio::test]
async fn aborted_task_still_releases_its_guard() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = create_async_client(Some(&fixture.dsn("db")), Some(1)).await?;

    assert_eq!(client.free_size().await, client.capacity());

    let task_client = client.clone();
    let handle = tokio::spawn(async move {
        let _guard = task_client.acquire().await.expect("acquire");
        std::future::pending::<()>().await;
    });

    // Give the task a moment to actually acquire before aborting it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.free_size().await, 0);

    handle.abort();
    let _ = handle.await;

    // The guard's Drop impl spawns the release rather than awaiting it
    // inline, so give that spawned task a moment to run.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.free_size().await, client.capacity());

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn free_size_and_in_use_always_sum_to_capacity() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = create_async_client(Some(&fixture.dsn("db")), Some(4)).await?;
    assert_eq!(client.capacity(), 4);
    assert_eq!(client.free_size().await, 4);

    let mut guards = Vec::new();
    for _ in 0..3 {
        guards.push(client.acquire().await?);
    }
    assert_eq!(client.free_size().await, 1);

    while let Some(guard) = guards.pop() {
        guard.release().await?;
    }
    assert_eq!(client.free_size().await, client.capacity());

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_checkouts_never_exceed_capacity() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = create_async_client(Some(&fixture.dsn("db")), Some(3)).await?;

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let guard = client.acquire().await.expect("acquire");
            tokio::time::sleep(Duration::from_millis(5)).await;
            guard.release().await.expect("release");
        }));
    }
    for task in tasks {
        task.await?;
    }

    assert_eq!(client.free_size().await, client.capacity());
    client.close().await;
    Ok(())
}
