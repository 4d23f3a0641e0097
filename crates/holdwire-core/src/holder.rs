#![forbid(unsafe_code)]

//! Holders: nodes carrying zero-or-one current value.
//!
//! # Design
//!
//! [`Holder<T>`] is a cheaply cloneable handle to shared state: the current
//! value (if any), an optional fault, a version counter and two listener
//! lists (values and faults). [`RwHolder<T>`] is the settable flavour handed
//! to writers; derived holders built by combinators are plain `Holder<T>`s
//! that publish internally.
//!
//! # State machine
//!
//! ```text
//! Unset ──set──▶ Available(v1) ──set──▶ Available(v2) ──▶ …
//!   │                 │
//!   └──fail──▶ Faulted (overlay; cleared by the next set)
//! ```
//!
//! Availability is monotone: once a value has been set it is never taken
//! away. A fault does not erase the last good value; [`Holder::outcome`]
//! reports the fault in preference to it.
//!
//! # Invariants
//!
//! 1. `is_available()` is false until the first `set` and true forever after.
//! 2. `version()` increments by exactly 1 per `set`; faults do not bump it.
//! 3. Registering a listener never fires it; it sees only later values.
//! 4. Within one `set`, live listeners fire in registration order, on the
//!    caller's thread, before `set` returns.
//! 5. No internal lock is held while listeners run, so a listener may read
//!    this holder, set other holders, or register further listeners.
//!
//! # Failure Modes
//!
//! - **Concurrent writers**: two threads calling `set` on one holder each
//!   notify listeners with their own value; the interleaving of those two
//!   passes is unspecified and the stored value is whichever write landed
//!   last. Callers needing atomic multi-holder updates synchronize externally.
//! - **Listener panics**: the panic unwinds through `set`. The value is
//!   already stored, and listeners after the panicking one are skipped for
//!   that pass.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::HolderError;
use crate::listener::{Anchor, Deregister, ListenerId, ListenerList, Snapshot, Subscription};

static NEXT_HOLDER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a holder. Clones of a handle share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HolderId(u64);

impl HolderId {
    fn next() -> Self {
        Self(NEXT_HOLDER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "holder#{}", self.0)
    }
}

struct State<T> {
    value: Option<T>,
    fault: Option<HolderError>,
    version: u64,
}

struct HolderInner<T> {
    id: HolderId,
    label: Option<Arc<str>>,
    state: Mutex<State<T>>,
    values: Arc<Mutex<ListenerList<T>>>,
    faults: Arc<Mutex<ListenerList<HolderError>>>,
    /// Registrations this holder made on its sources, plus strong handles to
    /// those sources. Dropping the holder drops these, which deregisters them
    /// upstream.
    upstream: Mutex<Vec<Upstream>>,
}

/// One wired source of a derived holder. Sources are held strongly, so a
/// chain of derivations stays alive as long as its last link does.
struct Upstream {
    _subscription: Subscription,
    _source: Box<dyn Any + Send + Sync>,
}

/// A node carrying at most one current value, plus listener dispatch.
///
/// Cloning a `Holder` creates a new handle to the **same** state.
pub struct Holder<T> {
    inner: Arc<HolderInner<T>>,
}

impl<T> Clone for Holder<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Holder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Holder")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("value", &state.value)
            .field("fault", &state.fault)
            .field("version", &state.version)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Holder<T> {
    /// A holder with no value and no sources. Combinators wire it up.
    pub(crate) fn detached(label: Option<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(HolderInner {
                id: HolderId::next(),
                label,
                state: Mutex::new(State {
                    value: None,
                    fault: None,
                    version: 0,
                }),
                values: Arc::new(Mutex::new(ListenerList::new())),
                faults: Arc::new(Mutex::new(ListenerList::new())),
                upstream: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> HolderId {
        self.inner.id
    }

    /// Diagnostic label, if one was attached at construction.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// The last value set, or `None` if no value has ever been set.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.inner.state.lock().value.clone()
    }

    /// Whether at least one value has been set.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.state.lock().value.is_some()
    }

    /// The current fault, if the last attempt to produce a value failed.
    #[must_use]
    pub fn error(&self) -> Option<HolderError> {
        self.inner.state.lock().fault.clone()
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.inner.state.lock().fault.is_some()
    }

    /// Latest outcome: the fault if there is one, otherwise the value.
    /// `None` while unset and not failed.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<T, HolderError>> {
        let state = self.inner.state.lock();
        match &state.fault {
            Some(fault) => Some(Err(fault.clone())),
            None => state.value.clone().map(Ok),
        }
    }

    /// Number of values set so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.state.lock().version
    }

    /// Register a value listener that stays live while `anchor` (or any clone
    /// of it) is alive.
    ///
    /// The listener is not called with the current value. Callers that need it
    /// call [`get`](Self::get) after registering, accepting that a concurrent
    /// `set` between the two may be observed twice.
    pub fn register_listener<F>(&self, anchor: &Anchor, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.values.lock().push(anchor, Arc::new(callback))
    }

    /// Register a fault listener that stays live while `anchor` is alive.
    pub fn register_fault_listener<F>(&self, anchor: &Anchor, callback: F) -> ListenerId
    where
        F: Fn(&HolderError) + Send + Sync + 'static,
    {
        self.inner.faults.lock().push(anchor, Arc::new(callback))
    }

    /// Register a value listener owned by the returned [`Subscription`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let anchor = Anchor::new();
        let id = self.register_listener(&anchor, callback);
        let list: Weak<dyn Deregister> = Arc::downgrade(&self.inner.values) as Weak<dyn Deregister>;
        Subscription::new(id, anchor, list)
    }

    /// Register a fault listener owned by the returned [`Subscription`].
    pub fn subscribe_faults<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&HolderError) + Send + Sync + 'static,
    {
        let anchor = Anchor::new();
        let id = self.register_fault_listener(&anchor, callback);
        let list: Weak<dyn Deregister> = Arc::downgrade(&self.inner.faults) as Weak<dyn Deregister>;
        Subscription::new(id, anchor, list)
    }

    /// Value-listener entries currently held, dead ones included until the
    /// next `set` prunes them.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.values.lock().len()
    }

    /// Fault-listener entries currently held.
    #[must_use]
    pub fn fault_listener_count(&self) -> usize {
        self.inner.faults.lock().len()
    }

    /// Whether both handles point at the same holder.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakHolder<T> {
        WeakHolder {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Keep an upstream registration, and its source, alive for as long as
    /// this holder lives.
    pub(crate) fn own<S>(&self, source: &Holder<S>, subscription: Subscription)
    where
        S: Clone + Send + Sync + 'static,
    {
        self.inner.upstream.lock().push(Upstream {
            _subscription: subscription,
            _source: Box::new(source.clone()),
        });
    }

    /// Number of sources this holder is wired to.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.inner.upstream.lock().len()
    }

    pub(crate) fn publish(&self, value: T) {
        let version = {
            let mut state = self.inner.state.lock();
            state.value = Some(value.clone());
            state.fault = None;
            state.version += 1;
            state.version
        };
        let Snapshot { live, pruned } = self.inner.values.lock().snapshot();
        tracing::trace!(
            message = "holder.set",
            holder = self.inner.id.raw(),
            label = self.label().unwrap_or(""),
            version,
            listeners = live.len(),
            pruned = pruned.len()
        );
        drop(pruned);
        for listener in &live {
            listener.fire(&value);
        }
    }

    pub(crate) fn publish_fault(&self, error: HolderError) {
        self.inner.state.lock().fault = Some(error.clone());
        let Snapshot { live, pruned } = self.inner.faults.lock().snapshot();
        tracing::debug!(
            message = "holder.fault",
            holder = self.inner.id.raw(),
            label = self.label().unwrap_or(""),
            error = %error,
            listeners = live.len()
        );
        drop(pruned);
        for listener in &live {
            listener.fire(&error);
        }
    }

    pub(crate) fn apply(&self, outcome: Result<T, HolderError>) {
        match outcome {
            Ok(value) => self.publish(value),
            Err(error) => self.publish_fault(error),
        }
    }
}

/// Non-owning handle used by upstream callbacks, so that a source never keeps
/// its dependents alive.
pub(crate) struct WeakHolder<T> {
    inner: Weak<HolderInner<T>>,
}

impl<T> Clone for WeakHolder<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakHolder<T> {
    pub(crate) fn upgrade(&self) -> Option<Holder<T>> {
        self.inner.upgrade().map(|inner| Holder { inner })
    }
}

/// A settable holder: the root of a propagation graph.
///
/// Dereferences to [`Holder<T>`] for reads, listener registration and
/// derivations.
pub struct RwHolder<T> {
    holder: Holder<T>,
}

impl<T> Clone for RwHolder<T> {
    fn clone(&self) -> Self {
        Self {
            holder: self.holder.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RwHolder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RwHolder").field(&self.holder).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> RwHolder<T> {
    /// An unset holder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            holder: Holder::detached(None),
        }
    }

    /// An unset holder carrying a diagnostic label for log fields.
    #[must_use]
    pub fn labelled(label: impl Into<Arc<str>>) -> Self {
        Self {
            holder: Holder::detached(Some(label.into())),
        }
    }

    /// A holder that is available from the start.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        let holder = Self::new();
        holder.set(value);
        holder
    }

    /// Store `value`, mark the holder available, clear any fault, then notify
    /// live listeners in registration order.
    pub fn set(&self, value: T) {
        self.holder.publish(value);
    }

    /// Put the holder into a fault state and notify fault listeners. Value
    /// listeners are not called.
    pub fn fail(&self, error: impl Into<HolderError>) {
        self.holder.publish_fault(error.into());
    }

    /// Set the result of `f` applied to the current value.
    pub fn update(&self, f: impl FnOnce(Option<T>) -> T) {
        let next = f(self.holder.get());
        self.set(next);
    }

    /// A read-only handle to the same holder.
    #[must_use]
    pub fn holder(&self) -> Holder<T> {
        self.holder.clone()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for RwHolder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for RwHolder<T> {
    type Target = Holder<T>;

    fn deref(&self) -> &Holder<T> {
        &self.holder
    }
}

impl<T> From<RwHolder<T>> for Holder<T> {
    fn from(holder: RwHolder<T>) -> Self {
        holder.holder
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
