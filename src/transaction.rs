//! The retrying transaction state machine: BEGIN, run the caller's body,
//! COMMIT or ROLLBACK, classify any failure, and either retry on a fresh
//! connection or give up.
//!
//! A transaction never reuses a connection across attempts — each attempt
//! gets its own checkout from the pool, so a connection left in a bad state
//! by a failed attempt can never bleed into the next one.

use std::ops::{Deref, DerefMut};

use futures_core::future::BoxFuture;

use crate::acquire::AcquireGuard;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::pool::Pool;

/// One BEGIN..COMMIT/ROLLBACK cycle of a [`Transaction`], obtained from
/// [`Transaction::next_attempt`].
///
/// Dropping an `Attempt` without calling `commit` or `rollback` releases its
/// connection with the transaction left open server-side; the next
/// operation the holder performs against that connection will find it in
/// that state, which is why [`Transaction::run`] always issues an explicit
/// rollback on a failed body.
pub struct Attempt {
    connection: AcquireGuard,
    number: u32,
}

impl Attempt {
    /// The 1-based attempt number.
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl Deref for Attempt {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl DerefMut for Attempt {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

/// The connection and attempt metadata passed to a [`Transaction::run`] body.
pub struct TransactionContext<'a> {
    connection: &'a mut Connection,
    attempt_number: u32,
    options: &'a Options,
}

impl<'a> TransactionContext<'a> {
    /// The 1-based attempt number; `1` on the first try, incremented each
    /// time the body is retried after a classified, retry-eligible failure.
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub fn options(&self) -> &Options {
        self.options
    }
}

impl<'a> Deref for TransactionContext<'a> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
    }
}

impl<'a> DerefMut for TransactionContext<'a> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection
    }
}

enum Classification {
    Retry,
    GiveUp,
}

/// A retrying transaction bound to a pool and an [`Options`] bundle.
///
/// Built by [`Client::transaction`](crate::client::Client::transaction);
/// rarely constructed directly.
pub struct Transaction {
    pool: Pool,
    options: Options,
}

impl Transaction {
    pub(crate) fn new(pool: Pool, options: Options) -> Self {
        Self { pool, options }
    }

    /// Check out a fresh connection and BEGIN on it for the given attempt
    /// number. The low-level primitive [`run`](Transaction::run) is built
    /// on top of; most callers should prefer `run`.
    pub async fn next_attempt(&self, number: u32) -> Result<Attempt> {
        let connection = self.pool.acquire().await?;
        let mut guard = AcquireGuard::new(connection, self.pool.clone());
        guard.begin(self.options.transaction_options()).await?;
        Ok(Attempt {
            connection: guard,
            number,
        })
    }

    /// Run `body` to completion, retrying on a fresh connection whenever the
    /// failure it (or the COMMIT that follows it) produces carries a
    /// [`RetryCondition`](crate::error::RetryCondition) this transaction's
    /// retry policy still has attempts left for.
    ///
    /// `body` returns a boxed future rather than an `impl Future` directly
    /// because its output must be allowed to borrow the `TransactionContext`
    /// argument, and a plain `Fut: Future` type parameter can't express a
    /// return type whose lifetime varies with each call — the same
    /// constraint that shows up in any closure-driven transaction helper
    /// over a borrowed connection. Write the body as
    /// `|tx| Box::pin(async move { .. })`.
    ///
    /// The body is called at most once per attempt: if it is cancelled
    /// mid-attempt, the whole `run` future is dropped and the in-progress
    /// attempt's connection releases (with the transaction left open
    /// server-side) rather than being retried.
    pub async fn run<F, T>(&self, mut body: F) -> Result<T>
    where
        F: for<'a> FnMut(&'a mut TransactionContext<'a>) -> BoxFuture<'a, Result<T>>,
    {
        let mut attempt_number = 1u32;
        loop {
            let mut attempt = self.next_attempt(attempt_number).await?;
            let outcome = {
                let mut ctx = TransactionContext {
                    connection: &mut *attempt.connection,
                    attempt_number,
                    options: &self.options,
                };
                body(&mut ctx).await
            };

            let result = match outcome {
                Ok(value) => match attempt.connection.commit().await {
                    Ok(()) => Ok(value),
                    Err(commit_error) => Err(commit_error),
                },
                Err(body_error) => {
                    // Best-effort: we already have an error to report, and a
                    // failed rollback doesn't change what the caller needs
                    // to hear about.
                    let _ = attempt.connection.rollback().await;
                    Err(body_error)
                }
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) => match self.classify(&error, attempt_number).await {
                    Classification::Retry => {
                        attempt_number += 1;
                        continue;
                    }
                    Classification::GiveUp => return Err(error),
                },
            }
        }
    }

    async fn classify(&self, error: &Error, attempt_number: u32) -> Classification {
        let Some(condition) = error.retry_condition() else {
            return Classification::GiveUp;
        };
        let retry = self.options.retry_options();
        if !retry.should_retry(condition, attempt_number) {
            return Classification::GiveUp;
        }

        let backoff = retry.backoff_for(condition, attempt_number);
        tracing::debug!(?condition, attempt_number, ?backoff, "retrying transaction");
        tokio::time::sleep(backoff).await;
        Classification::Retry
    }
}
