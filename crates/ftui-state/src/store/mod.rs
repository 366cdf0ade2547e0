#![forbid(unsafe_code)]

//! Named-property containers.
//!
//! A [`Store`] maps string keys to properties. Entries are created lazily by
//! `set_or_create` and the `set_and_*` helpers; consumers take two-way links
//! ([`Store::link`]) or one-way projections ([`Store::prop`]) instead of
//! holding the stored property itself.
//!
//! Two compositions sit on top:
//!
//! - [`AppStorage`]: the single app-wide store.
//! - [`StoreRegistry`]: independently scoped stores addressed by path.
//!
//! # Invariants
//!
//! 1. A key is removed only when its property has no subscribers.
//! 2. [`Store::clear`] is all-or-nothing: one busy key blocks the whole clear.
//! 3. A removed property is torn down before `delete`/`clear` returns.
//!
//! # Failure Modes
//!
//! - **Busy key**: `delete` of a subscribed key reports the subscriber count
//!   and leaves the key in place.
//! - **Absent value**: writing [`Value::Null`] is refused; a store never holds
//!   the "no value" sentinel.

mod app;
mod scoped;

pub use app::AppStorage;
pub use scoped::StoreRegistry;

use std::cell::RefCell;
use std::fmt;

use ahash::AHashMap;
use tracing::{debug, trace};

use crate::error::{Result, StateError, reported, reported_opt};
use crate::property::{ObservableProperty, PropertyRef, create_property};
use crate::registry::{Registry, Subscriber, SubscriberId};
use crate::value::{Shape, Value};

/// Key-indexed container of properties.
pub struct Store {
    registry: Registry,
    entries: RefCell<AHashMap<String, PropertyRef>>,
}

impl Store {
    #[must_use]
    pub fn new(registry: &Registry) -> Self {
        Self {
            registry: registry.clone(),
            entries: RefCell::new(AHashMap::new()),
        }
    }

    /// Create a store pre-populated from `seed`.
    ///
    /// Entries whose value is [`Value::Null`] are skipped and logged.
    pub fn with_seed<I, K, V>(registry: &Registry, seed: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let store = Self::new(registry);
        for (key, value) in seed {
            let key = key.into();
            store.set_or_create(&key, value);
        }
        store
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// All keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// The stored property for `key`.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<PropertyRef> {
        self.entries.borrow().get(key).cloned()
    }

    fn require(&self, key: &str) -> Result<PropertyRef> {
        self.property(key).ok_or_else(|| StateError::KeyNotFound {
            key: key.to_owned(),
        })
    }

    /// Current value of `key`; subscribers of the stored property observe the
    /// read.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.property(key).map(|property| property.read())
    }

    /// Write an existing key. Fails without effect if the key is missing or
    /// `value` is absent.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        reported("set", self.try_set(key, value))
    }

    pub fn try_set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if value.is_null() {
            return Err(StateError::NoValue {
                key: key.to_owned(),
            });
        }
        let property = self.require(key)?;
        if property.write(value) {
            Ok(())
        } else {
            Err(StateError::WriteRejected {
                key: key.to_owned(),
            })
        }
    }

    /// Write `key`, creating a property of the matching shape if missing.
    pub fn set_or_create(&self, key: &str, value: impl Into<Value>) -> bool {
        reported("set_or_create", self.try_set_or_create(key, value))
    }

    pub fn try_set_or_create(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if self.has(key) {
            return self.try_set(key, value);
        }
        let property = create_property(&self.registry, value, None, Some(key))?;
        debug!(key, property = %property.id(), "store entry created");
        self.entries.borrow_mut().insert(key.to_owned(), property);
        Ok(())
    }

    /// Two-way link to `key`. `label` defaults to the key.
    pub fn link(
        &self,
        key: &str,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Option<PropertyRef> {
        reported_opt("link", self.try_link(key, owner, label))
    }

    pub fn try_link(
        &self,
        key: &str,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Result<PropertyRef> {
        let property = self.require(key)?;
        property.try_create_link(owner, Some(label.unwrap_or(key)))
    }

    /// Create `key` from `default` if missing, then link to it.
    pub fn set_and_link(
        &self,
        key: &str,
        default: impl Into<Value>,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Option<PropertyRef> {
        reported_opt(
            "set_and_link",
            self.ensure(key, default)
                .and_then(|()| self.try_link(key, owner, label)),
        )
    }

    /// One-way projection of `key`. Object-shaped keys cannot be projected.
    pub fn prop(
        &self,
        key: &str,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Option<PropertyRef> {
        reported_opt("prop", self.try_prop(key, owner, label))
    }

    pub fn try_prop(
        &self,
        key: &str,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Result<PropertyRef> {
        let property = self.require(key)?;
        property.try_create_projection(owner, Some(label.unwrap_or(key)))
    }

    /// Create `key` from `default` if missing, then project it.
    pub fn set_and_prop(
        &self,
        key: &str,
        default: impl Into<Value>,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Option<PropertyRef> {
        reported_opt(
            "set_and_prop",
            self.try_set_and_prop(key, default, owner, label),
        )
    }

    /// A missing key with an object-shaped default is left uncreated.
    pub fn try_set_and_prop(
        &self,
        key: &str,
        default: impl Into<Value>,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Result<PropertyRef> {
        let default = default.into();
        if !self.has(key) && default.shape() == Some(Shape::Object) {
            return Err(StateError::NotProjectable {
                key: key.to_owned(),
                found: default.kind(),
            });
        }
        self.ensure(key, default)?;
        self.try_prop(key, owner, label)
    }

    fn ensure(&self, key: &str, default: impl Into<Value>) -> Result<()> {
        if self.has(key) {
            trace!(key, "key exists, default ignored");
            return Ok(());
        }
        self.try_set_or_create(key, default)
    }

    /// Remove `key`, tearing its property down. Fails if it has subscribers.
    pub fn delete(&self, key: &str) -> bool {
        reported("delete", self.try_delete(key))
    }

    pub fn try_delete(&self, key: &str) -> Result<()> {
        let property = self.require(key)?;
        let subscribers = property.subscriber_count();
        if subscribers > 0 {
            return Err(StateError::KeyBusy {
                key: key.to_owned(),
                subscribers,
            });
        }
        self.entries.borrow_mut().remove(key);
        property.teardown(None);
        debug!(key, "store entry deleted");
        Ok(())
    }

    /// Remove every key, or nothing if any key has subscribers.
    pub fn clear(&self) -> bool {
        reported("clear", self.try_clear())
    }

    pub fn try_clear(&self) -> Result<()> {
        let busy: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|key| {
                self.property(key)
                    .is_some_and(|property| property.subscriber_count() > 0)
            })
            .collect();
        if !busy.is_empty() {
            return Err(StateError::StoreBusy { keys: busy });
        }
        let drained: Vec<(String, PropertyRef)> = self.entries.borrow_mut().drain().collect();
        for (key, property) in drained {
            property.teardown(None);
            trace!(key = key.as_str(), "store entry cleared");
        }
        Ok(())
    }

    /// Subscribe `subscriber` directly to the stored property of `key`.
    pub fn subscribe_to_changes_of(&self, key: &str, subscriber: SubscriberId) -> bool {
        reported(
            "subscribe_to_changes_of",
            self.require(key).map(|property| {
                property.subscribe(subscriber);
            }),
        )
    }

    pub fn unsubscribe_from_changes_of(&self, key: &str, subscriber: SubscriberId) -> bool {
        reported(
            "unsubscribe_from_changes_of",
            self.require(key).map(|property| {
                property.unsubscribe(subscriber);
            }),
        )
    }

    /// Subscriber count of `key`'s property, or `None` for a missing key.
    #[must_use]
    pub fn number_of_subscribers_to(&self, key: &str) -> Option<usize> {
        self.property(key).map(|property| property.subscriber_count())
    }

    /// Prepare the store for disposal. Identical to [`Store::clear`].
    pub fn about_to_be_deleted(&self) -> bool {
        self.clear()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("keys", &self.keys()).finish()
    }
}
