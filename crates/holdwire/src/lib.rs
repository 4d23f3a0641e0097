#![forbid(unsafe_code)]

//! holdwire public facade crate.
//!
//! Re-exports the holder core and, with the `cache` feature (on by default),
//! the keyed expiring cache.
//!
//! ```
//! use holdwire::prelude::*;
//!
//! let celsius = RwHolder::<f64>::new();
//! let fahrenheit = celsius.mult_const(9.0).div_const(5.0).add_const(32.0);
//! let freezing = celsius.le_const(0.0);
//!
//! celsius.set(100.0);
//! assert_eq!(fahrenheit.get(), Some(212.0));
//! assert_eq!(freezing.get(), Some(false));
//! ```

pub use holdwire_core as core;

#[cfg(feature = "cache")]
pub use holdwire_cache as cache;

pub mod prelude {
    pub use holdwire_core::{
        Anchor, ArithmeticError, BoolHolderExt, FetchError, FloatHolderExt, Holder, HolderError,
        NumericHolderExt, RwHolder, Subscription, combine_n, combine2, combine3, map, try_map,
    };

    #[cfg(feature = "cache")]
    pub use holdwire_cache::{Backing, CacheConfig, Completion, KeyedCache, Requested};
}
