//! An async client core for a strongly-typed graph-relational database
//! speaking a binary framed protocol over TCP/TLS: a concurrent connection
//! pool plus a retrying transaction state machine built on top of it.
//!
//! The protocol codec and the query-shape-aware execution surface are
//! deliberately out of scope — this crate owns connection lifecycle,
//! pooling, and retry, nothing else.

#[macro_use]
/// Macro helper for enum mode definitions.
mod enum_mode;

/// The scoped acquire guard returned by [`Client::acquire`].
mod acquire;
/// The user-visible handle wrapping a [`Pool`] with per-call options.
mod client;
/// Connection argument parsing and the `LatticeDb` pool/client builder.
mod config;
/// DSN/credential parsing and TLS mode.
mod connect_config;
/// The single-connection handle and its wire-protocol driver.
mod connection;
/// Error types and result helpers.
pub mod error;
/// Logging levels for pool lifecycle events.
mod logger;
/// Per-call option bundles: transaction defaults, retry policy, session state.
mod options;
/// The connection pool implementation.
mod pool;
/// Retry policy: per-condition attempt counts and jittered back-off.
pub mod retry;
/// Server-reported settings cached by the pool.
mod session;
/// The retrying transaction state machine.
mod transaction;

pub use crate::{
    acquire::AcquireGuard,
    client::{create_async_client, create_async_pool, async_connect, Client},
    config::LatticeDb,
    connect_config::{ConnectConfig, ParseError, TlsMode},
    connection::Connection,
    error::{ConnectionErrorKind, Error, Result, RetryCondition, TransactionErrorKind},
    logger::LogSettings,
    options::{IsolationLevel, Options, State, TransactionOptions},
    pool::{Pool, PoolConfig},
    retry::{BackoffFn, JitterSource, NoJitter, RetryOptions, RetryRule, SeededJitter},
    session::SessionSettings,
    transaction::{Attempt, Transaction, TransactionContext},
};
