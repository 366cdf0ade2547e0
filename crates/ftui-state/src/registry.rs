#![forbid(unsafe_code)]

//! Subscriber identities and the registry that resolves them.
//!
//! Every participant in change propagation (properties, links, projections,
//! stores that mirror state elsewhere, renderer-side views) is addressed by a
//! [`SubscriberId`]. Properties only ever store ids; the [`Registry`] turns an
//! id back into a live [`Subscriber`] at notification time. This keeps the
//! ownership graph acyclic even when a property owns an observed object whose
//! owner set points back at the property.
//!
//! # Invariants
//!
//! 1. Ids are process-unique and strictly increasing; they are never reused.
//! 2. The registry holds `Weak` references and never extends a subscriber's
//!    lifetime.
//! 3. Registering an id twice is rejected and leaves the table unchanged.
//!
//! # Failure Modes
//!
//! - **Dangling entry**: a subscriber dropped without unregistering. Lookups
//!   log an error and resolve to `None`; notification skips it silently.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use tracing::{debug, error, trace};

use crate::error::{Result, StateError, reported};
use crate::value::Value;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a subscriber or publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability interface for anything that listens to properties.
///
/// All hooks default to no-ops, so a subscriber implements only the ones it
/// cares about. The renderer typically implements `property_has_changed` to
/// mark a view dirty and `property_read` to record dependencies during a
/// render pass.
pub trait Subscriber {
    /// Identity under which this subscriber is registered.
    fn id(&self) -> SubscriberId;

    /// The observed value changed; `value` is the new value.
    fn has_changed(&self, _value: &Value) {}

    /// The property labelled `label` changed.
    fn property_has_changed(&self, _label: Option<&str>) {}

    /// The property labelled `label` was read.
    fn property_read(&self, _label: Option<&str>) {}
}

type Entries = AHashMap<SubscriberId, Weak<dyn Subscriber>>;

thread_local! {
    static SHARED: Registry = Registry::new();
}

/// Table from [`SubscriberId`] to subscriber.
///
/// Cloning a `Registry` creates a new handle to the **same** table.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Rc<RefCell<Entries>>,
}

impl Registry {
    /// Create an empty, independent registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The thread's shared registry, used by [`AppStorage::instance`].
    ///
    /// [`AppStorage::instance`]: crate::store::AppStorage::instance
    #[must_use]
    pub fn shared() -> Self {
        SHARED.with(Registry::clone)
    }

    /// Issue a fresh identity, greater than every identity issued before.
    #[must_use]
    pub fn allocate(&self) -> SubscriberId {
        SubscriberId::next()
    }

    /// Register `subscriber` under its own id.
    ///
    /// Returns `false` without modifying the table if the id is taken.
    pub fn register<S: Subscriber + 'static>(&self, subscriber: &Rc<S>) -> bool {
        reported("register", self.try_register(subscriber))
    }

    pub fn try_register<S: Subscriber + 'static>(&self, subscriber: &Rc<S>) -> Result<()> {
        let id = subscriber.id();
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(&id) {
            return Err(StateError::AlreadyRegistered { id });
        }
        let weak = Rc::downgrade(subscriber) as Weak<dyn Subscriber>;
        entries.insert(id, weak);
        trace!(subscriber = %id, "registered");
        Ok(())
    }

    /// Resolve `id` to a live subscriber.
    #[must_use]
    pub fn lookup(&self, id: SubscriberId) -> Option<Rc<dyn Subscriber>> {
        let weak = self.entries.borrow().get(&id).cloned()?;
        let found = weak.upgrade();
        if found.is_none() {
            error!(subscriber = %id, "registry entry outlived its subscriber");
        }
        found
    }

    /// Remove `id`. Returns whether it was present.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self.entries.borrow_mut().remove(&id).is_some();
        if removed {
            trace!(subscriber = %id, "unregistered");
        } else {
            debug!(subscriber = %id, "unregister of unknown subscriber");
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whether both handles point at the same table.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.len())
            .finish()
    }
}

/// Ordered set of subscriber ids with registry-resolved fan-out.
///
/// Used both for a property's subscribers and for an observed object's
/// owners. Notification walks a snapshot, so hooks may subscribe or
/// unsubscribe re-entrantly; ids removed mid-walk are skipped.
#[derive(Debug, Default)]
pub struct SubscriberSet {
    ids: RefCell<BTreeSet<SubscriberId>>,
}

impl SubscriberSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id`. Returns `false` if it was already present.
    pub fn insert(&self, id: SubscriberId) -> bool {
        self.ids.borrow_mut().insert(id)
    }

    /// Remove `id`. Returns `false` if it was absent.
    pub fn remove(&self, id: SubscriberId) -> bool {
        self.ids.borrow_mut().remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.ids.borrow().contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.borrow().is_empty()
    }

    /// Snapshot of the current ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<SubscriberId> {
        self.ids.borrow().iter().copied().collect()
    }

    /// Tell every member that `value` is the new value of `label`.
    pub fn notify_changed(&self, registry: &Registry, value: &Value, label: Option<&str>) {
        for id in self.ids() {
            if !self.contains(id) {
                continue;
            }
            if let Some(subscriber) = registry.lookup(id) {
                subscriber.has_changed(value);
                subscriber.property_has_changed(label);
            }
        }
    }

    /// Tell every member that `label` was read.
    pub fn notify_read(&self, registry: &Registry, label: Option<&str>) {
        for id in self.ids() {
            if !self.contains(id) {
                continue;
            }
            if let Some(subscriber) = registry.lookup(id) {
                subscriber.property_read(label);
            }
        }
    }
}
