#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use tracing::{debug, info};

use super::Store;
use crate::registry::Registry;
use crate::value::Value;

thread_local! {
    static INSTANCE: RefCell<Option<AppStorage>> = const { RefCell::new(None) };
}

/// The app-wide store.
///
/// Hosts either construct one explicitly with [`AppStorage::new`] and pass it
/// around, or use the lazily created per-thread [`AppStorage::instance`].
/// Every [`Store`] operation is available through `Deref`.
///
/// Cloning creates a new handle to the **same** store.
#[derive(Clone, Debug)]
pub struct AppStorage {
    store: Rc<Store>,
}

impl AppStorage {
    #[must_use]
    pub fn new(registry: &Registry) -> Self {
        Self {
            store: Rc::new(Store::new(registry)),
        }
    }

    pub fn with_seed<I, K, V>(registry: &Registry, seed: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            store: Rc::new(Store::with_seed(registry, seed)),
        }
    }

    /// The single instance, created on first access on [`Registry::shared`].
    #[must_use]
    pub fn instance() -> Self {
        INSTANCE.with(|slot| {
            slot.borrow_mut()
                .get_or_insert_with(|| {
                    debug!("creating app storage");
                    Self::new(&Registry::shared())
                })
                .clone()
        })
    }

    #[must_use]
    pub fn is_initialized() -> bool {
        INSTANCE.with(|slot| slot.borrow().is_some())
    }

    /// Clear and discard the single instance.
    ///
    /// Fails, keeping the instance, while any key has subscribers. Returns
    /// `true` if there was no instance.
    pub fn shutdown() -> bool {
        let Some(app) = INSTANCE.with(|slot| slot.borrow().clone()) else {
            return true;
        };
        if !app.about_to_be_deleted() {
            return false;
        }
        INSTANCE.with(|slot| slot.borrow_mut().take());
        info!("app storage shut down");
        true
    }

    #[must_use]
    pub fn store(&self) -> &Rc<Store> {
        &self.store
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }
}

impl Deref for AppStorage {
    type Target = Store;

    fn deref(&self) -> &Store {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::ObservableProperty;
    use crate::registry::Subscriber;
    use crate::testing::Probe;

    #[test]
    fn instance_is_created_once() {
        assert!(!AppStorage::is_initialized());
        let a = AppStorage::instance();
        let b = AppStorage::instance();
        assert!(a.ptr_eq(&b));
        assert!(a.registry().ptr_eq(&Registry::shared()));
        assert!(AppStorage::is_initialized());
        assert!(AppStorage::shutdown());
    }

    #[test]
    fn operations_go_through_deref() {
        let app = AppStorage::instance();
        assert!(app.set_or_create("theme", "dark"));
        assert_eq!(AppStorage::instance().get("theme"), Some(Value::from("dark")));
        assert!(AppStorage::shutdown());
        assert!(!AppStorage::instance().has("theme"));
        assert!(AppStorage::shutdown());
    }

    #[test]
    fn shutdown_fails_while_subscribed() {
        let app = AppStorage::instance();
        let owner = Probe::registered(app.registry());
        let link = app.set_and_link("count", 1, Some(owner.id()), None).unwrap();

        assert!(!AppStorage::shutdown());
        assert!(AppStorage::is_initialized());
        assert!(app.has("count"));

        link.teardown(Some(owner.id()));
        assert!(AppStorage::shutdown());
        assert!(!AppStorage::is_initialized());
    }

    #[test]
    fn explicit_instances_are_independent() {
        let registry = Registry::new();
        let a = AppStorage::with_seed(&registry, [("k", 1)]);
        let b = AppStorage::new(&registry);
        assert!(!a.ptr_eq(&b));
        assert!(a.has("k"));
        assert!(!b.has("k"));
        assert!(a.clone().ptr_eq(&a));
    }
}
