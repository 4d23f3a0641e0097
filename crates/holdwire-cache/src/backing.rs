#![forbid(unsafe_code)]

//! Backings: where a [`KeyedCache`](crate::KeyedCache) gets its values from.
//!
//! A backing receives one [`Completion`] per request and reports the outcome
//! through it, synchronously or later from any thread. Completing settles the
//! cache entry for that request (if it is still the current one) and then
//! publishes on the pending holder handed out by `fetch`.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use holdwire_core::{FetchError, RwHolder};

use crate::cache::Entries;
use crate::requested::Requested;

/// Source of values for a cache.
pub trait Backing<K, T>: Send + Sync {
    /// Start a request for `key`. The backing must eventually call one of the
    /// completion's methods, or drop it to report
    /// [`FetchError::Abandoned`].
    fn request(&self, key: &K, completion: Completion<K, T>)
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static;
}

/// Adapts a synchronous fetch function into a [`Backing`].
pub struct FnBacking<F> {
    fetch: F,
}

impl<F> FnBacking<F> {
    #[must_use]
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<F> fmt::Debug for FnBacking<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBacking").finish_non_exhaustive()
    }
}

impl<K, T, F> Backing<K, T> for FnBacking<F>
where
    F: Fn(&K) -> Result<Requested<T>, FetchError> + Send + Sync,
{
    fn request(&self, key: &K, completion: Completion<K, T>)
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        completion.complete((self.fetch)(key));
    }
}

/// Handle for reporting the outcome of one backing request.
///
/// Dropping it without calling [`complete`](Self::complete),
/// [`succeed`](Self::succeed) or [`fail`](Self::fail) fails the pending
/// holder with [`FetchError::Abandoned`] and clears the entry.
#[must_use = "dropping a Completion abandons the request"]
pub struct Completion<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    key: K,
    ticket: u64,
    holder: Option<RwHolder<T>>,
    entries: Weak<Entries<K, T>>,
    label: Option<Arc<str>>,
}

impl<K, T> Completion<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        key: K,
        ticket: u64,
        holder: RwHolder<T>,
        entries: Weak<Entries<K, T>>,
        label: Option<Arc<str>>,
    ) -> Self {
        Self {
            key,
            ticket,
            holder: Some(holder),
            entries,
            label,
        }
    }

    /// The key this request is for.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Monotonic request number; later requests carry larger tickets.
    #[must_use]
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Report the outcome of the request.
    pub fn complete(mut self, outcome: Result<Requested<T>, FetchError>) {
        self.finish(outcome);
    }

    pub fn succeed(self, requested: Requested<T>) {
        self.complete(Ok(requested));
    }

    pub fn fail(self, error: FetchError) {
        self.complete(Err(error));
    }

    fn finish(&mut self, outcome: Result<Requested<T>, FetchError>) {
        let Some(holder) = self.holder.take() else {
            return;
        };
        let current = self
            .entries
            .upgrade()
            .is_some_and(|entries| entries.settle(&self.key, self.ticket, &holder, &outcome));
        let cache = self.label.as_deref().unwrap_or("");
        match outcome {
            Ok(requested) => {
                tracing::trace!(
                    message = "cache.filled",
                    cache,
                    ticket = self.ticket,
                    current
                );
                holder.set(requested.into_value());
            }
            Err(error) => {
                tracing::warn!(
                    message = "cache.fetch_failed",
                    cache,
                    ticket = self.ticket,
                    error = %error,
                    current
                );
                holder.fail(error);
            }
        }
    }
}

impl<K, T> fmt::Debug for Completion<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("ticket", &self.ticket)
            .field("pending", &self.holder.is_some())
            .finish_non_exhaustive()
    }
}

impl<K, T> Drop for Completion<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.holder.is_some() {
            self.finish(Err(FetchError::Abandoned));
        }
    }
}
