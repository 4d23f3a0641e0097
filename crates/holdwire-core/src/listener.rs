#![forbid(unsafe_code)]

//! Weak listener registration.
//!
//! Every holder keeps an ordered listener list per notification channel.
//! An entry pairs a callback with a `Weak` reference to an [`Anchor`] owned by
//! whoever registered it. The list never keeps an anchor alive; it only asks
//! whether the anchor is still alive when a notification pass reaches it.
//!
//! # Invariants
//!
//! 1. Entries fire in registration order.
//! 2. An entry whose anchor has been dropped never fires again.
//! 3. Dead entries are removed lazily, during the next notification pass over
//!    the list, never by a background sweep.
//! 4. Dropping a [`Subscription`] removes its entry immediately.
//! 5. No callback runs while the list lock is held, and no dead entry is
//!    dropped while it is held either (a dropped callback may own a holder
//!    whose teardown deregisters from this very list).
//!
//! # Failure Modes
//!
//! - **Anchor dropped without a subscription**: the entry stays in the list,
//!   inert, until the next notification pass prunes it. A holder that is never
//!   notified again never prunes it; `Holder::listener_count` still counts it.
//! - **List dropped first**: a [`Subscription`] outliving its holder finds no
//!   list to deregister from and does nothing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one registration within a holder's listener list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct AnchorToken;

/// Liveness token for listener registrations.
///
/// Clones share one token. Registrations made with an anchor stay live
/// exactly as long as at least one clone of it exists.
#[derive(Clone)]
pub struct Anchor {
    token: Arc<AnchorToken>,
}

impl Anchor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: Arc::new(AnchorToken),
        }
    }

    fn downgrade(&self) -> Weak<AnchorToken> {
        Arc::downgrade(&self.token)
    }

    /// Whether both anchors are clones of the same token.
    #[must_use]
    pub fn ptr_eq(&self, other: &Anchor) -> bool {
        Arc::ptr_eq(&self.token, &other.token)
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("clones", &Arc::strong_count(&self.token))
            .finish()
    }
}

pub(crate) type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct Entry<A> {
    id: ListenerId,
    anchor: Weak<AnchorToken>,
    callback: Callback<A>,
}

/// A live entry captured for one notification pass. Holding the upgraded
/// anchor keeps the registration alive until the pass is over.
pub(crate) struct Live<A> {
    _anchor: Arc<AnchorToken>,
    callback: Callback<A>,
}

impl<A> Live<A> {
    pub(crate) fn fire(&self, arg: &A) {
        (self.callback)(arg);
    }
}

/// Result of snapshotting a list for notification.
///
/// `pruned` must be dropped after the list lock is released.
pub(crate) struct Snapshot<A> {
    pub(crate) live: Vec<Live<A>>,
    pub(crate) pruned: Vec<Callback<A>>,
}

/// Ordered collection of weakly anchored callbacks.
pub(crate) struct ListenerList<A> {
    entries: Vec<Entry<A>>,
}

impl<A: 'static> ListenerList<A> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, anchor: &Anchor, callback: Callback<A>) -> ListenerId {
        let id = ListenerId::next();
        self.entries.push(Entry {
            id,
            anchor: anchor.downgrade(),
            callback,
        });
        id
    }

    /// Remove one entry, handing it back so the caller can drop it unlocked.
    pub(crate) fn remove(&mut self, id: ListenerId) -> Option<Callback<A>> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index).callback)
    }

    /// Entries currently held, including dead ones not yet pruned.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Split the list into live callbacks (in order) and pruned dead entries.
    pub(crate) fn snapshot(&mut self) -> Snapshot<A> {
        let mut live = Vec::with_capacity(self.entries.len());
        let mut pruned = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            match entry.anchor.upgrade() {
                Some(anchor) => {
                    live.push(Live {
                        _anchor: anchor,
                        callback: Arc::clone(&entry.callback),
                    });
                    kept.push(entry);
                }
                None => pruned.push(entry.callback),
            }
        }
        self.entries = kept;
        Snapshot { live, pruned }
    }
}

/// Type-erased access to a listener list, so a [`Subscription`] need not know
/// the value type of the holder it came from.
pub(crate) trait Deregister: Send + Sync {
    fn deregister(&self, id: ListenerId);
}

impl<A: 'static> Deregister for Mutex<ListenerList<A>> {
    fn deregister(&self, id: ListenerId) {
        let removed = self.lock().remove(id);
        drop(removed);
    }
}

/// RAII registration: owns its anchor and deregisters on drop.
///
/// Derived holders keep one `Subscription` per upstream source, which is what
/// ties "stays subscribed" to "is still reachable".
#[must_use = "dropping a Subscription immediately deregisters its listener"]
pub struct Subscription {
    id: ListenerId,
    anchor: Anchor,
    list: Weak<dyn Deregister>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, anchor: Anchor, list: Weak<dyn Deregister>) -> Self {
        Self { id, anchor, list }
    }

    /// Identifier of the underlying registration.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// The anchor keeping this registration alive.
    #[must_use]
    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &(self.list.strong_count() > 0))
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.deregister(self.id);
        }
    }
}
