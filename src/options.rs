//! Per-call option bundles attached to a borrowed connection for the
//! duration of an acquire scope or transaction attempt.

use std::sync::Arc;

use crate::retry::RetryOptions;

enum_mode! {
    /// Transaction isolation level sent with BEGIN.
    pub IsolationLevel {
        Serializable => "SERIALIZABLE",
        RepeatableRead => "REPEATABLE READ",
    }
    default Serializable
}

/// Opaque session state carried alongside a connection. The core only
/// ever moves this value around; its contents are not interpreted here.
#[derive(Clone, Debug, Default)]
pub struct State(pub(crate) Arc<Vec<(String, String)>>);

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut entries = (*self.0).clone();
        entries.push((key.into(), value.into()));
        self.0 = Arc::new(entries);
        self
    }
}

/// The BEGIN-time flags for a transaction.
#[derive(Clone, Copy, Debug)]
pub struct TransactionOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
    pub deferrable: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::default(),
            read_only: false,
            deferrable: false,
        }
    }
}

impl TransactionOptions {
    #[must_use]
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = deferrable;
        self
    }
}

/// The immutable per-call bundle attached to a connection borrowed from the
/// pool: transaction defaults, retry policy, and opaque session state.
#[derive(Clone, Debug, Default)]
pub struct Options {
    pub(crate) transaction: TransactionOptions,
    pub(crate) retry: RetryOptions,
    pub(crate) state: State,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_transaction_options(mut self, transaction: TransactionOptions) -> Self {
        self.transaction = transaction;
        self
    }

    #[must_use]
    pub fn with_retry_options(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn transaction_options(&self) -> &TransactionOptions {
        &self.transaction
    }

    pub fn retry_options(&self) -> &RetryOptions {
        &self.retry
    }

    pub fn state(&self) -> &State {
        &self.state
    }
}
