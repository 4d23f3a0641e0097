#![forbid(unsafe_code)]

//! Core: value holders, weak listener registration, derivation combinators
//! and the numeric/boolean operator algebra.
//!
//! A [`RwHolder`] is a settable node; everything else in a propagation graph
//! is a [`Holder`] derived from one or more sources. Derived holders recompute
//! synchronously, on the writer's thread, before `set` returns.
//!
//! ```
//! use holdwire_core::{NumericHolderExt, RwHolder};
//!
//! let width = RwHolder::<i32>::new();
//! let height = RwHolder::<i32>::new();
//! let area = width.mult(&height);
//!
//! width.set(3);
//! assert!(!area.is_available());
//! height.set(4);
//! assert_eq!(area.get(), Some(12));
//! width.set(5);
//! assert_eq!(area.get(), Some(20));
//! ```
//!
//! Listener registration never keeps the listener alive: entries are tied to
//! an [`Anchor`] and go inert when it is dropped. [`Subscription`] bundles an
//! anchor with eager deregistration.

pub mod algebra;
pub mod combine;
pub mod error;
pub mod holder;
pub mod listener;

pub use algebra::{
    BoolHolderExt, FloatHolderExt, FloatNumeric, Numeric, NumericHolderExt, NumericKind,
};
pub use combine::{
    combine_n, combine2, combine3, map, try_combine_n, try_combine2, try_combine3, try_map,
};
pub use error::{ArithmeticError, FetchError, HolderError, Result};
pub use holder::{Holder, HolderId, RwHolder};
pub use listener::{Anchor, ListenerId, Subscription};
