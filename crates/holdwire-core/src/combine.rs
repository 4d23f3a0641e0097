#![forbid(unsafe_code)]

//! Derivation combinators.
//!
//! Each combinator builds a new holder and wires it to its sources with one
//! [`Subscription`](crate::Subscription) per source. The derived holder owns
//! those subscriptions and a strong handle to each source; the upstream
//! callbacks only hold a weak handle back to the derived holder. Ownership
//! therefore points upstream only: a derivation stays wired exactly as long
//! as something keeps the derived holder (or a holder derived from it)
//! alive, and its upstream registrations disappear when it is dropped.
//!
//! # Invariants
//!
//! 1. A derived holder is seeded from its sources' current values at
//!    construction, then recomputed on every source update.
//! 2. `combine*` only computes once every source has produced a value; after
//!    that gate it recomputes on each update of any source.
//! 3. A failing transform faults only its own holder. Value propagation stops
//!    below it; sibling derivations of the same source are unaffected.
//! 4. A source fault is not forwarded: dependents keep their last value.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::HolderError;
use crate::holder::Holder;

/// Subscribe `derived` to `source`. `on_value` runs with the derived holder
/// upgraded; it is skipped once the derived holder is gone.
fn wire<S, U>(
    source: &Holder<S>,
    derived: &Holder<U>,
    on_value: impl Fn(&S, &Holder<U>) + Send + Sync + 'static,
) where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    let target = derived.downgrade();
    let subscription = source.subscribe(move |value| {
        if let Some(derived) = target.upgrade() {
            on_value(value, &derived);
        }
    });
    derived.own(source, subscription);
}

/// Derive a holder whose value is `f` applied to each value of `source`.
#[must_use]
pub fn map<S, U, F>(source: &Holder<S>, f: F) -> Holder<U>
where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(&S) -> U + Send + Sync + 'static,
{
    try_map(source, move |value| Ok(f(value)))
}

/// Like [`map`], but a transform error faults the derived holder.
#[must_use]
pub fn try_map<S, U, F>(source: &Holder<S>, f: F) -> Holder<U>
where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(&S) -> Result<U, HolderError> + Send + Sync + 'static,
{
    let derived = Holder::detached(None);
    let f = Arc::new(f);
    let transform = Arc::clone(&f);
    wire(source, &derived, move |value, target| target.apply(transform(value)));
    if let Some(current) = source.get() {
        derived.apply(f(&current));
    }
    derived
}

/// Combine two holders of possibly different types.
#[must_use]
pub fn combine2<A, B, U, F>(a: &Holder<A>, b: &Holder<B>, f: F) -> Holder<U>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(&A, &B) -> U + Send + Sync + 'static,
{
    try_combine2(a, b, move |x, y| Ok(f(x, y)))
}

/// Like [`combine2`], but a transform error faults the derived holder.
#[must_use]
pub fn try_combine2<A, B, U, F>(a: &Holder<A>, b: &Holder<B>, f: F) -> Holder<U>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(&A, &B) -> Result<U, HolderError> + Send + Sync + 'static,
{
    let derived = Holder::detached(None);
    let slots: Arc<Mutex<(Option<A>, Option<B>)>> = Arc::new(Mutex::new((None, None)));
    let f = Arc::new(f);

    let refresh = {
        let slots = Arc::clone(&slots);
        let f = Arc::clone(&f);
        Arc::new(move |target: &Holder<U>| {
            let outcome = match &*slots.lock() {
                (Some(x), Some(y)) => f(x, y),
                _ => return,
            };
            target.apply(outcome);
        })
    };

    {
        let slots = Arc::clone(&slots);
        let refresh = Arc::clone(&refresh);
        wire(a, &derived, move |value, target| {
            slots.lock().0 = Some(value.clone());
            refresh(target);
        });
    }
    {
        let slots = Arc::clone(&slots);
        let refresh = Arc::clone(&refresh);
        wire(b, &derived, move |value, target| {
            slots.lock().1 = Some(value.clone());
            refresh(target);
        });
    }

    {
        let mut slots = slots.lock();
        if slots.0.is_none() {
            slots.0 = a.get();
        }
        if slots.1.is_none() {
            slots.1 = b.get();
        }
    }
    refresh(&derived);
    derived
}

/// Combine three holders of possibly different types.
#[must_use]
pub fn combine3<A, B, C, U, F>(a: &Holder<A>, b: &Holder<B>, c: &Holder<C>, f: F) -> Holder<U>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(&A, &B, &C) -> U + Send + Sync + 'static,
{
    try_combine3(a, b, c, move |x, y, z| Ok(f(x, y, z)))
}

/// Like [`combine3`], but a transform error faults the derived holder.
#[must_use]
pub fn try_combine3<A, B, C, U, F>(a: &Holder<A>, b: &Holder<B>, c: &Holder<C>, f: F) -> Holder<U>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(&A, &B, &C) -> Result<U, HolderError> + Send + Sync + 'static,
{
    let derived = Holder::detached(None);
    let slots: Arc<Mutex<(Option<A>, Option<B>, Option<C>)>> =
        Arc::new(Mutex::new((None, None, None)));
    let f = Arc::new(f);

    let refresh = {
        let slots = Arc::clone(&slots);
        let f = Arc::clone(&f);
        Arc::new(move |target: &Holder<U>| {
            let outcome = match &*slots.lock() {
                (Some(x), Some(y), Some(z)) => f(x, y, z),
                _ => return,
            };
            target.apply(outcome);
        })
    };

    {
        let slots = Arc::clone(&slots);
        let refresh = Arc::clone(&refresh);
        wire(a, &derived, move |value, target| {
            slots.lock().0 = Some(value.clone());
            refresh(target);
        });
    }
    {
        let slots = Arc::clone(&slots);
        let refresh = Arc::clone(&refresh);
        wire(b, &derived, move |value, target| {
            slots.lock().1 = Some(value.clone());
            refresh(target);
        });
    }
    {
        let slots = Arc::clone(&slots);
        let refresh = Arc::clone(&refresh);
        wire(c, &derived, move |value, target| {
            slots.lock().2 = Some(value.clone());
            refresh(target);
        });
    }

    {
        let mut slots = slots.lock();
        if slots.0.is_none() {
            slots.0 = a.get();
        }
        if slots.1.is_none() {
            slots.1 = b.get();
        }
        if slots.2.is_none() {
            slots.2 = c.get();
        }
    }
    refresh(&derived);
    derived
}

/// Combine any number of holders of one type. `f` receives the latest value
/// of each source, in source order.
///
/// With no sources the result is seeded with `f(&[])` and never changes.
#[must_use]
pub fn combine_n<S, U, F>(sources: &[Holder<S>], f: F) -> Holder<U>
where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(&[S]) -> U + Send + Sync + 'static,
{
    try_combine_n(sources, move |values| Ok(f(values)))
}

/// Like [`combine_n`], but a transform error faults the derived holder.
#[must_use]
pub fn try_combine_n<S, U, F>(sources: &[Holder<S>], f: F) -> Holder<U>
where
    S: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(&[S]) -> Result<U, HolderError> + Send + Sync + 'static,
{
    let derived = Holder::detached(None);
    let slots: Arc<Mutex<Vec<Option<S>>>> = Arc::new(Mutex::new(vec![None; sources.len()]));
    let f = Arc::new(f);

    let refresh = {
        let slots = Arc::clone(&slots);
        let f = Arc::clone(&f);
        Arc::new(move |target: &Holder<U>| {
            let outcome = {
                let slots = slots.lock();
                let values: Option<Vec<S>> = slots.iter().cloned().collect();
                match values {
                    Some(values) => f(&values),
                    None => return,
                }
            };
            target.apply(outcome);
        })
    };

    for (index, source) in sources.iter().enumerate() {
        let slots = Arc::clone(&slots);
        let refresh = Arc::clone(&refresh);
        wire(source, &derived, move |value, target| {
            slots.lock()[index] = Some(value.clone());
            refresh(target);
        });
    }

    {
        let mut slots = slots.lock();
        for (slot, source) in slots.iter_mut().zip(sources) {
            if slot.is_none() {
                *slot = source.get();
            }
        }
    }
    refresh(&derived);
    derived
}

impl<T: Clone + Send + Sync + 'static> Holder<T> {
    /// Method form of [`map`].
    #[must_use]
    pub fn map<U, F>(&self, f: F) -> Holder<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        map(self, f)
    }

    /// Method form of [`try_map`].
    #[must_use]
    pub fn try_map<U, F>(&self, f: F) -> Holder<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> Result<U, HolderError> + Send + Sync + 'static,
    {
        try_map(self, f)
    }

    /// Method form of [`combine2`].
    #[must_use]
    pub fn combine<B, U, F>(&self, other: &Holder<B>, f: F) -> Holder<U>
    where
        B: Clone + Send + Sync + 'static,
        U: Clone + Send + Sync + 'static,
        F: Fn(&T, &B) -> U + Send + Sync + 'static,
    {
        combine2(self, other, f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
