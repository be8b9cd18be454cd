//! S2 (conflict retry) and the retry-related testable properties: a body
//! that fails with a retryable tag up to `max_attempts - 1` times eventually
//! succeeds; one more failure than the policy allows surfaces to the caller;
//! a non-retryable error never loops.

mod support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use latticedb::error::{Error, RetryCondition, TransactionErrorKind};
use latticedb::retry::{RetryOptions, RetryRule};
use latticedb::LatticeDb;
use support::{Fixture, FixtureConfig};

fn fast_retry(max_attempts: u32) -> RetryOptions {
    RetryOptions::new().with_rule(
        RetryCondition::TransactionConflict,
        RetryRule::new(max_attempts).with_backoff(Arc::new(|_| Duration::from_millis(1))),
    )
}

#[tokio::test]
async fn conflict_retried_then_succeeds() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = LatticeDb::dsn(&fixture.dsn("db"))?
        .retry_options(fast_retry(3))
        .connect()
        .await?;

    let attempts = Arc::new(AtomicU32::new(0));
    let result = client
        .transaction()
        .run({
            let attempts = attempts.clone();
            move |_tx| {
                let attempts = attempts.clone();
                Box::pin(async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(Error::Transaction {
                            kind: TransactionErrorKind::Conflict,
                            message: "serialization failure".into(),
                        })
                    } else {
                        Ok(42)
                    }
                })
            }
        })
        .await?;

    assert_eq!(result, 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    use std::sync::atomic::Ordering as O;
    assert_eq!(fixture.counters.begins.load(O::SeqCst), 3);
    assert_eq!(fixture.counters.commits.load(O::SeqCst), 1);
    assert_eq!(fixture.counters.rollbacks.load(O::SeqCst), 2);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn conflict_exhausts_attempts_and_surfaces() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = LatticeDb::dsn(&fixture.dsn("db"))?
        .retry_options(fast_retry(2))
        .connect()
        .await?;

    let attempts = Arc::new(AtomicU32::new(0));
    let result: Result<(), Error> = client
        .transaction()
        .run({
            let attempts = attempts.clone();
            move |_tx| {
                let attempts = attempts.clone();
                Box::pin(async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Transaction {
                        kind: TransactionErrorKind::Conflict,
                        message: "always conflicts".into(),
                    })
                })
            }
        })
        .await;

    assert!(matches!(
        result,
        Err(Error::Transaction {
            kind: TransactionErrorKind::Conflict,
            ..
        })
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn non_retryable_error_never_loops() -> anyhow::Result<()> {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = LatticeDb::dsn(&fixture.dsn("db"))?.connect().await?;

    let attempts = Arc::new(AtomicU32::new(0));
    let result: Result<(), Error> = client
        .transaction()
        .run({
            let attempts = attempts.clone();
            move |_tx| {
                let attempts = attempts.clone();
                Box::pin(async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Interface("caller misuse".into()))
                })
            }
        })
        .await;

    assert!(matches!(result, Err(Error::Interface(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn each_attempt_gets_its_own_connection() -> anyhow::Result<()> {
    // Every attempt acquires a fresh connection rather than reusing one
    // across retries — observable here as one `connects` tick per attempt
    // once the pool has to reopen a just-released single-capacity slot.
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let client = LatticeDb::dsn(&fixture.dsn("db"))?
        .concurrency(1)
        .retry_options(fast_retry(3))
        .connect()
        .await?;

    let attempts = Arc::new(AtomicU32::new(0));
    client
        .transaction()
        .run({
            let attempts = attempts.clone();
            move |ctx| {
                let attempts = attempts.clone();
                let number = ctx.attempt_number();
                Box::pin(async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    assert_eq!(number, n);
                    if n < 2 {
                        Err(Error::Transaction {
                            kind: TransactionErrorKind::Conflict,
                            message: "retry once".into(),
                        })
                    } else {
                        Ok(())
                    }
                })
            }
        })
        .await?;

    assert_eq!(client.free_size().await, client.capacity());
    client.close().await;
    Ok(())
}
