//! Types for working with errors produced by latticedb.

use std::io;
use std::time::Duration;

/// A specialized `Result` type for latticedb.
pub type Result<T> = std::result::Result<T, Error>;

/// The class of a [`Error::Connection`], mirroring the retry classification
/// the server/transport layer guarantees is stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Worth retrying with back-off: the server was momentarily unreachable
    /// or reset the connection.
    FailedTemporarily,
    /// Not worth retrying: e.g. authentication rejected the credentials.
    Failed,
    /// The connection was closed out from under us; the holder must replace
    /// it before the caller can proceed.
    Closed,
    /// The operation exceeded its deadline.
    Timeout,
}

/// The class of a [`Error::Transaction`], all of which are retry-eligible
/// subject to the active [`RetryOptions`](crate::retry::RetryOptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    Conflict,
    Serialization,
    Deadlock,
}

/// A tag attached to an error indicating which [`RetryRule`](crate::retry::RetryRule)
/// governs retrying it. Driver errors are expected to carry a stable tag
/// across versions; this core only ever consumes the tag, never the
/// concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryCondition {
    TransactionConflict,
    NetworkError,
}

/// All the ways an operation against the pool, a connection, or a
/// transaction can fail.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport-level failure talking to the server.
    #[error("connection error ({kind:?}): {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    /// I/O failure underlying a connection error.
    #[error("I/O error communicating with server: {0}")]
    Io(#[from] io::Error),

    /// A server-reported transaction failure eligible for retry.
    #[error("transaction error ({kind:?}): {message}")]
    Transaction {
        kind: TransactionErrorKind,
        message: String,
    },

    /// Caller-side misuse: released twice, foreign connection, pool closing,
    /// nested acquire. Never retried, always surfaced.
    #[error("interface error: {0}")]
    Interface(String),

    /// An invariant was violated inside the core itself. Never retried,
    /// always surfaced; indicates a bug in this crate.
    #[error("internal client error: {0}")]
    Internal(String),

    /// [`Pool::acquire`](crate::pool::Pool::acquire) timed out waiting for a
    /// free holder or for a new connection to complete.
    #[error("timed out after {0:?} waiting for a connection")]
    PoolTimedOut(Duration),

    /// The pool has been closed; no further acquisitions will succeed.
    #[error("pool is closed")]
    PoolClosed,

    /// Any other server-reported error this core does not classify for
    /// retry purposes. Surfaced unchanged to the caller.
    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    /// The retry-condition tag this error carries, if any. Classification
    /// in the retry loop consults exactly this.
    pub fn retry_condition(&self) -> Option<RetryCondition> {
        match self {
            Error::Transaction { .. } => Some(RetryCondition::TransactionConflict),
            Error::Connection {
                kind: ConnectionErrorKind::FailedTemporarily,
                ..
            } => Some(RetryCondition::NetworkError),
            _ => None,
        }
    }

    pub(crate) fn is_closed_connection(&self) -> bool {
        matches!(
            self,
            Error::Connection {
                kind: ConnectionErrorKind::Closed,
                ..
            }
        )
    }
}
