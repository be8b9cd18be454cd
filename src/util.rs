//! Small shared plumbing that doesn't deserve its own module.

use std::future::Future;
use std::pin::Pin;

/// A boxed, `Send` future, for storing hook closures without dragging in a
/// combinator crate for a single type alias.
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
