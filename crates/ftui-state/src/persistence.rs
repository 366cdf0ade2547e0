#![forbid(unsafe_code)]

//! Mirroring app-wide store entries into a key/value backend.
//!
//! [`PersistentStorage`] keeps a two-way link to every persisted key of an
//! [`AppStorage`] and subscribes to those links. When a persisted value
//! changes, values are written to the [`PersistenceBackend`] as JSON text.
//!
//! # Write policy
//!
//! By default every persisted key is rewritten on any change
//! ([`WritePolicy::AllKeys`]). [`WritePolicy::ChangedKey`] rewrites only the
//! key whose link reported the change.
//!
//! # Failure Modes
//!
//! - **Undecodable entry**: a backend value that is not valid JSON (or is
//!   JSON `null`) is treated as absent and the default is used.
//! - **Unencodable value**: logged; the backend keeps its previous entry.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::{debug, trace, warn};

use crate::error::{Result, StateError, reported};
use crate::property::{ObservableProperty, PropertyRef};
use crate::registry::{Subscriber, SubscriberId};
use crate::store::AppStorage;
use crate::value::Value;

/// Synchronous string-keyed storage owned by the host.
pub trait PersistenceBackend {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn delete(&self, key: &str);
}

/// In-process backend, for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with raw (already encoded) entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RefCell::new(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl PersistenceBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
    }

    fn delete(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// Which keys are written when a persisted value changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WritePolicy {
    /// Rewrite every persisted key.
    #[default]
    AllKeys,
    /// Rewrite only the key that changed.
    ChangedKey,
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceConfig {
    pub write_policy: WritePolicy,
}

impl PersistenceConfig {
    #[must_use]
    pub fn with_write_policy(mut self, write_policy: WritePolicy) -> Self {
        self.write_policy = write_policy;
        self
    }
}

/// Persistence mirror over an [`AppStorage`].
pub struct PersistentStorage {
    id: SubscriberId,
    app: AppStorage,
    backend: Rc<dyn PersistenceBackend>,
    config: PersistenceConfig,
    links: RefCell<AHashMap<String, PropertyRef>>,
}

impl PersistentStorage {
    pub fn new(app: &AppStorage, backend: Rc<dyn PersistenceBackend>) -> Rc<Self> {
        Self::with_config(app, backend, PersistenceConfig::default())
    }

    pub fn with_config(
        app: &AppStorage,
        backend: Rc<dyn PersistenceBackend>,
        config: PersistenceConfig,
    ) -> Rc<Self> {
        let storage = Rc::new(Self {
            id: app.registry().allocate(),
            app: app.clone(),
            backend,
            config,
            links: RefCell::new(AHashMap::new()),
        });
        app.registry().register(&storage);
        storage
    }

    #[must_use]
    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Persist `key`, then write its value to the backend.
    ///
    /// An existing app-store value wins; otherwise the backend's value is
    /// loaded, falling back to `default`.
    pub fn persist(&self, key: &str, default: impl Into<Value>) -> bool {
        reported("persist", self.try_persist(key, default))
    }

    pub fn try_persist(&self, key: &str, default: impl Into<Value>) -> Result<()> {
        self.attach(key, default.into())?;
        self.write_key(key)
    }

    /// Persist several keys, then rewrite every persisted key once.
    ///
    /// Returns whether every key was attached.
    pub fn persist_all<I, K, V>(&self, entries: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut all = true;
        for (key, default) in entries {
            all &= reported("persist", self.attach(key.as_ref(), default.into()));
        }
        self.write_all();
        all
    }

    fn attach(&self, key: &str, default: Value) -> Result<()> {
        if default.is_null() {
            return Err(StateError::NoValue {
                key: key.to_owned(),
            });
        }
        if self.links.borrow().contains_key(key) {
            return Err(StateError::AlreadyPersisted {
                key: key.to_owned(),
            });
        }
        let link = if self.app.has(key) {
            debug!(key, "persisting existing app storage value");
            self.app.try_link(key, Some(self.id), Some(key))?
        } else {
            let initial = self.load(key).unwrap_or_else(|| {
                debug!(key, "no stored entry, using default");
                default
            });
            self.app.try_set_or_create(key, initial)?;
            self.app.try_link(key, Some(self.id), Some(key))?
        };
        self.links.borrow_mut().insert(key.to_owned(), link);
        Ok(())
    }

    fn load(&self, key: &str) -> Option<Value> {
        let raw = self.backend.get(key)?;
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Null) => None,
            Ok(json) => Some(Value::from(json)),
            Err(err) => {
                warn!(key, %err, "stored entry is not valid JSON, ignoring it");
                None
            }
        }
    }

    /// Stop persisting `key` and remove it from the backend.
    ///
    /// The app-store entry itself is kept.
    pub fn unpersist(&self, key: &str) -> bool {
        reported("unpersist", self.try_unpersist(key))
    }

    pub fn try_unpersist(&self, key: &str) -> Result<()> {
        let link = self
            .links
            .borrow_mut()
            .remove(key)
            .ok_or_else(|| StateError::KeyNotFound {
                key: key.to_owned(),
            })?;
        link.teardown(Some(self.id));
        self.backend.delete(key);
        debug!(key, "no longer persisted");
        Ok(())
    }

    /// Persisted keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.links.borrow().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    #[must_use]
    pub fn is_persisted(&self, key: &str) -> bool {
        self.links.borrow().contains_key(key)
    }

    /// Force-write one key, for changes the engine cannot observe.
    pub fn notify_has_changed(&self, key: &str) -> bool {
        reported("notify_has_changed", self.write_key(key))
    }

    /// Write every persisted key to the backend.
    pub fn write_all(&self) {
        for key in self.keys() {
            reported("write", self.write_key(&key));
        }
    }

    fn write_key(&self, key: &str) -> Result<()> {
        let link = self
            .links
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::KeyNotFound {
                key: key.to_owned(),
            })?;
        let encoded = serde_json::to_string(&link.peek()).map_err(|err| StateError::Encode {
            key: key.to_owned(),
            message: err.to_string(),
        })?;
        trace!(key, "writing to backend");
        self.backend.set(key, &encoded);
        Ok(())
    }

    /// Tear down every link and leave the registry. Backend entries are kept.
    pub fn about_to_be_deleted(&self) {
        let links: Vec<(String, PropertyRef)> = self.links.borrow_mut().drain().collect();
        for (key, link) in links {
            link.teardown(Some(self.id));
            trace!(key = key.as_str(), "persistence link released");
        }
        self.app.registry().unregister(self.id);
        debug!("persistent storage released");
    }
}

impl Subscriber for PersistentStorage {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn property_has_changed(&self, label: Option<&str>) {
        match (self.config.write_policy, label) {
            (WritePolicy::ChangedKey, Some(key)) if self.is_persisted(key) => {
                reported("write", self.write_key(key));
            }
            _ => self.write_all(),
        }
    }
}

impl fmt::Debug for PersistentStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentStorage")
            .field("id", &self.id)
            .field("keys", &self.keys())
            .field("config", &self.config)
            .finish()
    }
}
