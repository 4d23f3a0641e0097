#![forbid(unsafe_code)]

//! Keyed cache of lazily fetched, time-expiring values.
//!
//! # Design
//!
//! Each key maps to one of two entry states:
//!
//! ```text
//!           fetch (miss / stale)            Ok(Requested)
//! (absent) ─────────────────────▶ Pending ───────────────▶ Ready(holder, expiry)
//!     ▲                             │                          │
//!     └──────── Err(FetchError) ────┘   fetch at/after expiry  │
//!                                   ◀──────────────────────────┘
//! ```
//!
//! `fetch` always returns a holder. A Ready entry that is still fresh hands
//! back its holder, which already carries the value. Otherwise a new pending
//! holder goes into the map under the lock, the lock is released, and the
//! backing is asked for the value.
//!
//! # Invariants
//!
//! 1. Check-and-insert of a Pending entry happens under one lock acquisition,
//!    so with single-flight on there is at most one request in flight per key.
//! 2. A completion only settles the map entry if it still carries the ticket
//!    it was issued with. A superseded or invalidated request still publishes
//!    to its own holder.
//! 3. Failures are never cached: a failed request removes its entry.
//! 4. Entries are never evicted proactively; staleness is checked on access.
//! 5. The backing runs, and holders publish, with the map lock released.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use holdwire_core::{FetchError, Holder, RwHolder};

use crate::backing::{Backing, Completion, FnBacking};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::requested::Requested;

enum Entry<T> {
    Pending { ticket: u64, holder: Holder<T> },
    Ready { holder: Holder<T>, requested: Requested<T> },
}

/// The key map plus the ticket counter. Completions hold it weakly, so an
/// outstanding request never keeps a dropped cache alive.
pub(crate) struct Entries<K, T> {
    map: Mutex<AHashMap<K, Entry<T>>>,
    next_ticket: AtomicU64,
}

impl<K, T> Entries<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            map: Mutex::new(AHashMap::new()),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Record the outcome of request `ticket`. Returns whether that request
    /// still owned the entry.
    pub(crate) fn settle(
        &self,
        key: &K,
        ticket: u64,
        holder: &Holder<T>,
        outcome: &Result<Requested<T>, FetchError>,
    ) -> bool {
        let displaced = {
            let mut map = self.map.lock();
            match map.get(key) {
                Some(Entry::Pending { ticket: current, .. }) if *current == ticket => {}
                _ => return false,
            }
            match outcome {
                Ok(requested) => map.insert(
                    key.clone(),
                    Entry::Ready {
                        holder: holder.clone(),
                        requested: requested.clone(),
                    },
                ),
                Err(_) => map.remove(key),
            }
        };
        drop(displaced);
        true
    }
}

/// Keyed cache whose values become available later and go stale after an
/// expiry instant.
///
/// Cloning a `KeyedCache` creates a new handle to the **same** entries.
pub struct KeyedCache<K, T> {
    entries: Arc<Entries<K, T>>,
    backing: Arc<dyn Backing<K, T>>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl<K, T> Clone for KeyedCache<K, T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            backing: Arc::clone(&self.backing),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<K, T> KeyedCache<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// A cache backed by a synchronous fetch function.
    #[must_use]
    pub fn new<F>(fetch: F) -> Self
    where
        F: Fn(&K) -> Result<Requested<T>, FetchError> + Send + Sync + 'static,
    {
        Self::with_backing(FnBacking::new(fetch))
    }

    /// A cache backed by a [`Backing`] that may complete requests later.
    #[must_use]
    pub fn with_backing<B>(backing: B) -> Self
    where
        B: Backing<K, T> + 'static,
    {
        Self {
            entries: Arc::new(Entries::new()),
            backing: Arc::new(backing),
            clock: Arc::new(SystemClock),
            config: CacheConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Read time from `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Holder for `key`'s value.
    ///
    /// - Fresh Ready entry: its holder, no backing call.
    /// - Pending entry with single-flight on: the same pending holder.
    /// - Otherwise: a new pending holder, and one backing request.
    ///
    /// A failed request surfaces as a [`HolderError::Fetch`] fault on the
    /// returned holder; the next `fetch` retries.
    ///
    /// [`HolderError::Fetch`]: holdwire_core::HolderError::Fetch
    pub fn fetch(&self, key: &K) -> Holder<T> {
        let now = self.clock.now();
        let label = self.config.label_str();

        let (pending, completion, displaced) = {
            let mut map = self.entries.map.lock();
            let mut stale = false;
            match map.get(key) {
                Some(Entry::Ready { holder, requested }) => {
                    if requested.is_fresh_at(now) {
                        tracing::trace!(message = "cache.hit", cache = label);
                        return holder.clone();
                    }
                    stale = true;
                }
                Some(Entry::Pending { ticket, holder }) if self.config.single_flight => {
                    tracing::trace!(message = "cache.pending", cache = label, ticket = *ticket);
                    return holder.clone();
                }
                _ => {}
            }

            let ticket = self.entries.next_ticket.fetch_add(1, Ordering::Relaxed);
            let pending = match &self.config.label {
                Some(name) => RwHolder::labelled(Arc::clone(name)),
                None => RwHolder::new(),
            };
            let displaced = map.insert(
                key.clone(),
                Entry::Pending {
                    ticket,
                    holder: pending.holder(),
                },
            );
            tracing::trace!(message = "cache.miss", cache = label, ticket, stale);
            let completion = Completion::new(
                key.clone(),
                ticket,
                pending.clone(),
                Arc::downgrade(&self.entries),
                self.config.label.clone(),
            );
            (pending, completion, displaced)
        };
        drop(displaced);

        self.backing.request(key, completion);
        pending.holder()
    }

    /// The fresh cached entry for `key`, if any. Never fetches.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<Requested<T>> {
        let now = self.clock.now();
        match self.entries.map.lock().get(key) {
            Some(Entry::Ready { requested, .. }) if requested.is_fresh_at(now) => {
                Some(requested.clone())
            }
            _ => None,
        }
    }

    /// Whether `key` has a request in flight.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        matches!(self.entries.map.lock().get(key), Some(Entry::Pending { .. }))
    }

    /// Forget `key`. An in-flight request for it still publishes to its
    /// holder but no longer fills the cache. Returns whether an entry existed.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.entries.map.lock().remove(key);
        let existed = removed.is_some();
        drop(removed);
        existed
    }

    /// Forget every entry.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.entries.map.lock());
        drop(drained);
    }

    /// Entries held, Pending and stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.map.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.map.lock().is_empty()
    }
}

impl<K, T> fmt::Debug for KeyedCache<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("config", &self.config)
            .field("entries", &self.entries.map.lock().len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use holdwire_core::HolderError;
    use std::sync::atomic::AtomicUsize;
    use web_time::{Duration, Instant};

    const TTL: Duration = Duration::from_secs(10);

    /// Synchronous cache counting backing calls; each value is the call number.
    fn counting(clock: &ManualClock) -> (KeyedCache<String, usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let backing_clock = clock.clone();
        let cache = KeyedCache::new(move |_key: &String| {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Requested::expiring_in(n, backing_clock.now(), TTL))
        })
        .with_clock(clock.clone());
        (cache, calls)
    }

    /// Parks completions so tests decide when, and how, requests finish.
    #[derive(Clone, Default)]
    struct Deferred {
        parked: Arc<Mutex<Vec<Completion<&'static str, u32>>>>,
    }

    impl Deferred {
        fn take(&self) -> Vec<Completion<&'static str, u32>> {
            std::mem::take(&mut *self.parked.lock())
        }
    }

    impl Backing<&'static str, u32> for Deferred {
        fn request(&self, _key: &&'static str, completion: Completion<&'static str, u32>) {
            self.parked.lock().push(completion);
        }
    }

    #[test]
    fn first_fetch_calls_backing_and_fills() {
        let clock = ManualClock::new();
        let (cache, calls) = counting(&clock);
        let holder = cache.fetch(&"a".to_string());
        assert_eq!(holder.get(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn fetch_before_expiry_skips_backing() {
        let clock = ManualClock::new();
        let (cache, calls) = counting(&clock);
        let key = "a".to_string();
        let first = cache.fetch(&key);
        clock.advance(TTL - Duration::from_millis(1));
        let second = cache.fetch(&key);
        assert!(first.ptr_eq(&second));
        assert_eq!(second.get(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fetch_at_expiry_refetches_exactly_once() {
        let clock = ManualClock::new();
        let (cache, calls) = counting(&clock);
        let key = "a".to_string();
        let first = cache.fetch(&key);
        let first_expiry = cache.peek(&key).map(|r| r.expires_at());

        clock.advance(TTL);
        assert_eq!(cache.peek(&key), None, "stale at the expiry instant");
        let second = cache.fetch(&key);
        let third = cache.fetch(&key);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!first.ptr_eq(&second), "entries are replaced, not mutated");
        assert!(second.ptr_eq(&third));
        assert_eq!(second.get(), Some(2));
        assert_eq!(first.get(), Some(1));

        let second_expiry = cache.peek(&key).map(|r| r.expires_at());
        assert!(second_expiry > first_expiry);
    }

    #[test]
    fn unbounded_ttl_is_cached_forever() {
        let clock = ManualClock::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let backing_clock = clock.clone();
        let cache = KeyedCache::new(move |key: &u32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Requested::expiring_in(*key, backing_clock.now(), Duration::MAX))
        })
        .with_clock(clock.clone());

        assert_eq!(cache.fetch(&1).get(), Some(1));
        clock.advance(Duration::from_secs(86_400 * 365 * 100));
        assert_eq!(cache.fetch(&1).get(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek(&1).and_then(|r| r.expires_at()), None);
    }

    #[test]
    fn keys_are_independent() {
        let clock = ManualClock::new();
        let (cache, calls) = counting(&clock);
        assert_eq!(cache.fetch(&"a".to_string()).get(), Some(1));
        assert_eq!(cache.fetch(&"b".to_string()).get(), Some(2));
        assert_eq!(cache.fetch(&"a".to_string()).get(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_is_not_cached_and_next_fetch_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let clock = ManualClock::new();
        let backing_clock = clock.clone();
        let cache = KeyedCache::new(move |key: &u8| {
            if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FetchError::failed(format!("key {key} offline")))
            } else {
                Ok(Requested::expiring_in(*key * 2, backing_clock.now(), TTL))
            }
        })
        .with_clock(clock);

        let failed = cache.fetch(&4);
        assert_eq!(
            failed.error(),
            Some(HolderError::Fetch(FetchError::failed("key 4 offline")))
        );
        assert!(!failed.is_available());
        assert!(cache.is_empty(), "failure leaves no entry");

        let retried = cache.fetch(&4);
        assert_eq!(retried.get(), Some(8));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn single_flight_shares_pending_holder() {
        let backing = Deferred::default();
        let cache = KeyedCache::with_backing(backing.clone());

        let a = cache.fetch(&"k");
        let b = cache.fetch(&"k");
        assert!(a.ptr_eq(&b));
        assert!(!a.is_available());
        assert!(cache.is_pending(&"k"));

        let mut parked = backing.take();
        assert_eq!(parked.len(), 1, "one request in flight");
        let completion = parked.remove(0);
        assert_eq!(*completion.key(), "k");
        completion.succeed(Requested::expiring_in(7, Instant::now(), Duration::from_secs(60)));

        assert_eq!(a.get(), Some(7));
        assert!(!cache.is_pending(&"k"));
        assert!(cache.fetch(&"k").ptr_eq(&a));
    }

    #[test]
    fn without_single_flight_newest_request_owns_entry() {
        let backing = Deferred::default();
        let cache = KeyedCache::with_backing(backing.clone())
            .with_config(CacheConfig::default().with_single_flight(false));

        let old = cache.fetch(&"k");
        let new = cache.fetch(&"k");
        assert!(!old.ptr_eq(&new));

        let mut parked = backing.take();
        assert_eq!(parked.len(), 2);
        let newest = parked.pop().expect("second request");
        let oldest = parked.pop().expect("first request");
        assert!(newest.ticket() > oldest.ticket());

        let far = Instant::now() + Duration::from_secs(60);
        newest.succeed(Requested::new(2, far));
        oldest.succeed(Requested::new(1, far));

        assert_eq!(old.get(), Some(1), "superseded request still publishes");
        assert_eq!(new.get(), Some(2));
        assert_eq!(cache.peek(&"k").map(Requested::into_value), Some(2));
        assert!(cache.fetch(&"k").ptr_eq(&new));
    }

    #[test]
    fn dropped_completion_abandons() {
        let backing = Deferred::default();
        let cache = KeyedCache::with_backing(backing.clone());
        let holder = cache.fetch(&"k");
        drop(backing.take());
        assert_eq!(
            holder.error(),
            Some(HolderError::Fetch(FetchError::Abandoned))
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn completion_from_another_thread() {
        let backing = Deferred::default();
        let cache = KeyedCache::with_backing(backing.clone());
        let holder = cache.fetch(&"k");
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        let _sub = holder.subscribe(move |v: &u32| *seen_clone.lock() = Some(*v));

        let completion = backing.take().pop().expect("parked request");
        std::thread::spawn(move || {
            completion.succeed(Requested::expiring_in(42, Instant::now(), Duration::from_secs(60)));
        })
        .join()
        .expect("completer thread");

        assert_eq!(*seen.lock(), Some(42));
        assert_eq!(cache.peek(&"k").map(Requested::into_value), Some(42));
    }

    #[test]
    fn invalidate_during_flight_does_not_refill() {
        let backing = Deferred::default();
        let cache = KeyedCache::with_backing(backing.clone());
        let holder = cache.fetch(&"k");
        assert!(cache.invalidate(&"k"));
        assert!(!cache.invalidate(&"k"));

        let completion = backing.take().pop().expect("parked request");
        completion.succeed(Requested::expiring_in(5, Instant::now(), Duration::from_secs(60)));
        assert_eq!(holder.get(), Some(5));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_and_len() {
        let clock = ManualClock::new();
        let (cache, calls) = counting(&clock);
        for key in ["a", "b", "c"] {
            let _ = cache.fetch(&key.to_string());
        }
        assert_eq!(cache.len(), 3);
        cache.clear();
        assert!(cache.is_empty());
        let _ = cache.fetch(&"a".to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn completion_outliving_cache_still_publishes() {
        let backing = Deferred::default();
        let cache = KeyedCache::with_backing(backing.clone());
        let holder = cache.fetch(&"k");
        drop(cache);
        let completion = backing.take().pop().expect("parked request");
        completion.fail(FetchError::failed("late"));
        assert!(holder.is_failed());
    }

    #[test]
    fn labelled_cache_labels_pending_holders() {
        let clock = ManualClock::new();
        let (cache, _) = counting(&clock);
        let cache = cache.with_config(CacheConfig::default().with_label("quotes"));
        let holder = cache.fetch(&"a".to_string());
        assert_eq!(holder.label(), Some("quotes"));
        assert!(format!("{cache:?}").contains("quotes"));
    }
}
