#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::debug;

use super::Store;
use crate::error::{Result, StateError, reported};
use crate::registry::Registry;
use crate::value::Value;

/// Independently scoped stores addressed by an opaque path.
pub struct StoreRegistry {
    registry: Registry,
    stores: RefCell<AHashMap<String, Rc<Store>>>,
}

impl StoreRegistry {
    #[must_use]
    pub fn new(registry: &Registry) -> Self {
        Self {
            registry: registry.clone(),
            stores: RefCell::new(AHashMap::new()),
        }
    }

    /// The store at `path`, created from `seed` if there is none yet.
    ///
    /// `seed` is ignored when the store already exists.
    pub fn get_or_create<I, K, V>(&self, path: &str, seed: I) -> Rc<Store>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        if let Some(store) = self.get(path) {
            return store;
        }
        let store = Rc::new(Store::with_seed(&self.registry, seed));
        self.stores
            .borrow_mut()
            .insert(path.to_owned(), Rc::clone(&store));
        debug!(path, "scoped store created");
        store
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Rc<Store>> {
        self.stores.borrow().get(path).cloned()
    }

    /// Register a pre-built store under `path`. Fails if the path is taken.
    pub fn add(&self, path: &str, store: Rc<Store>) -> bool {
        reported("add", self.try_add(path, store))
    }

    pub fn try_add(&self, path: &str, store: Rc<Store>) -> Result<()> {
        let mut stores = self.stores.borrow_mut();
        if stores.contains_key(path) {
            return Err(StateError::PathTaken {
                path: path.to_owned(),
            });
        }
        stores.insert(path.to_owned(), store);
        debug!(path, "scoped store added");
        Ok(())
    }

    /// Clear the store at `path` and forget it.
    ///
    /// The path stays registered if the store cannot be cleared.
    pub fn delete(&self, path: &str) -> bool {
        reported("delete", self.try_delete(path))
    }

    pub fn try_delete(&self, path: &str) -> Result<()> {
        let store = self.get(path).ok_or_else(|| StateError::PathNotFound {
            path: path.to_owned(),
        })?;
        store.try_clear()?;
        self.stores.borrow_mut().remove(path);
        debug!(path, "scoped store deleted");
        Ok(())
    }

    /// All paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.stores.borrow().keys().cloned().collect();
        paths.sort_unstable();
        paths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.borrow().is_empty()
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("paths", &self.paths())
            .finish()
    }
}
