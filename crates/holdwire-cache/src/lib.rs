#![forbid(unsafe_code)]

//! Keyed cache of lazily fetched, time-expiring values built on holders.
//!
//! `fetch` hands back a [`Holder`](holdwire_core::Holder) at once; it becomes
//! available when the backing reports a value, and the cached entry goes
//! stale at the expiry instant carried by [`Requested`].
//!
//! ```
//! use holdwire_cache::{KeyedCache, ManualClock, Requested};
//! use web_time::Duration;
//!
//! let clock = ManualClock::new();
//! let backing_clock = clock.clone();
//! let cache = KeyedCache::new(move |key: &u32| {
//!     Ok(Requested::expiring_in(key * 10, backing_clock.now(), Duration::from_secs(5)))
//! })
//! .with_clock(clock.clone());
//!
//! let price = cache.fetch(&4);
//! assert_eq!(price.get(), Some(40));
//! clock.advance(Duration::from_secs(5));
//! assert!(cache.peek(&4).is_none());
//! ```

pub mod backing;
pub mod cache;
pub mod clock;
pub mod config;
pub mod requested;

pub use backing::{Backing, Completion, FnBacking};
pub use cache::KeyedCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use requested::Requested;
