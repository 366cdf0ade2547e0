#![forbid(unsafe_code)]

//! Field-level observation of plain objects.
//!
//! [`ObservedObject`] wraps a [`Record`] behind an explicit accessor API:
//! reads pass through, and a write that changes a field notifies every owner
//! in the wrapper's owner set. Owners are the properties (or links) holding
//! the object, so a nested field mutation surfaces as a change of the owning
//! property.
//!
//! # Invariants
//!
//! 1. Wrapping is idempotent: [`ObservedObject::wrap`] on an already observed
//!    value returns the same wrapper and only adds the owner.
//! 2. A field write with an equal value is a no-op (no notifications).
//! 3. Removing the last owner does not destroy the wrapper; the owning
//!    property decides the object's lifetime.
//!
//! # Failure Modes
//!
//! - **Double construction**: [`ObservedObject::create_new`] on a value that is
//!   already observed fails with [`StateError::AlreadyObserved`]. Two wrappers
//!   around one object would split its owner set.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::error::{Result, StateError};
use crate::registry::{Registry, SubscriberId, SubscriberSet};
use crate::value::{Record, Value};

/// An observable that keeps its own owner set.
///
/// Object-shaped properties holding a managed observable register themselves
/// as owners instead of wrapping it. Implementations typically keep a
/// [`SubscriberSet`] and call [`SubscriberSet::notify_changed`] when they
/// mutate.
pub trait ManagedObservable {
    fn add_owner(&self, owner: SubscriberId);

    /// Returns `false` if `owner` was not an owner.
    fn remove_owner(&self, owner: SubscriberId) -> bool;

    /// JSON snapshot used when the value is persisted.
    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

pub type ManagedRef = Rc<dyn ManagedObservable>;

struct ObservedInner {
    registry: Registry,
    fields: RefCell<Record>,
    owners: SubscriberSet,
}

/// Shared handle to an observed object.
///
/// Cloning creates a new handle to the **same** object; equality of handles
/// is reference identity ([`ObservedObject::ptr_eq`]).
#[derive(Clone)]
pub struct ObservedObject {
    inner: Rc<ObservedInner>,
}

impl ObservedObject {
    /// Observe `value`, adding `owner` to its owner set.
    ///
    /// A [`Value::Record`] gets a fresh wrapper; an already observed object is
    /// returned as is. Scalars and managed observables cannot be wrapped.
    pub fn wrap(registry: &Registry, value: Value, owner: Option<SubscriberId>) -> Option<Self> {
        match value {
            Value::Object(existing) => {
                if let Some(owner) = owner {
                    existing.add_owner(owner);
                }
                Some(existing)
            }
            Value::Record(fields) => Some(Self::from_record(registry, fields, owner)),
            other => {
                warn!(kind = other.kind(), "only records can be observed");
                None
            }
        }
    }

    /// Construct a new wrapper, refusing values that are already observed.
    pub fn create_new(
        registry: &Registry,
        value: Value,
        owner: Option<SubscriberId>,
    ) -> Result<Self> {
        match value {
            Value::Record(fields) => Ok(Self::from_record(registry, fields, owner)),
            Value::Object(_) | Value::Managed(_) => Err(StateError::AlreadyObserved),
            other => Err(StateError::NotAnObject {
                found: other.kind(),
            }),
        }
    }

    fn from_record(registry: &Registry, fields: Record, owner: Option<SubscriberId>) -> Self {
        let owners = SubscriberSet::new();
        if let Some(owner) = owner {
            owners.insert(owner);
        }
        Self {
            inner: Rc::new(ObservedInner {
                registry: registry.clone(),
                fields: RefCell::new(fields),
                owners,
            }),
        }
    }

    /// Current value of `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        self.inner.fields.borrow().get(field).cloned()
    }

    /// Write `field`, notifying owners if the value changed.
    ///
    /// Returns whether the field changed.
    pub fn set(&self, field: impl Into<String>, value: impl Into<Value>) -> bool {
        let field = field.into();
        let value = value.into();
        {
            let mut fields = self.inner.fields.borrow_mut();
            if fields.get(&field) == Some(&value) {
                trace!(field = field.as_str(), "field write without change");
                return false;
            }
            fields.insert(field.clone(), value);
        }
        self.notify_owners(&field);
        true
    }

    /// Remove `field`, notifying owners if it was present.
    pub fn remove(&self, field: &str) -> Option<Value> {
        let removed = self.inner.fields.borrow_mut().remove(field)?;
        self.notify_owners(field);
        Some(removed)
    }

    fn notify_owners(&self, field: &str) {
        let this = Value::Object(self.clone());
        self.inner
            .owners
            .notify_changed(&self.inner.registry, &this, Some(field));
    }

    /// Snapshot of the unwrapped fields.
    #[must_use]
    pub fn raw(&self) -> Record {
        self.inner.fields.borrow().clone()
    }

    /// Borrow the unwrapped fields without cloning.
    pub fn with_fields<R>(&self, f: impl FnOnce(&Record) -> R) -> R {
        f(&self.inner.fields.borrow())
    }

    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    /// Add `owner`. Returns `false` if it already owned the object.
    pub fn add_owner(&self, owner: SubscriberId) -> bool {
        self.inner.owners.insert(owner)
    }

    /// Remove `owner`. Returns `false` if it was not an owner.
    pub fn remove_owner(&self, owner: SubscriberId) -> bool {
        self.inner.owners.remove(owner)
    }

    #[must_use]
    pub fn has_owner(&self, owner: SubscriberId) -> bool {
        self.inner.owners.contains(owner)
    }

    #[must_use]
    pub fn owner_count(&self) -> usize {
        self.inner.owners.len()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ObservedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ObservedObject");
        match self.inner.fields.try_borrow() {
            Ok(fields) => s.field("fields", &*fields),
            Err(_) => s.field("fields", &"<borrowed>"),
        };
        s.field("owners", &self.inner.owners.len()).finish()
    }
}

/// Make `owner` an owner of `value`, wrapping plain records.
pub(crate) fn claim(registry: &Registry, value: Value, owner: SubscriberId) -> Value {
    match value {
        Value::Object(object) => {
            object.add_owner(owner);
            Value::Object(object)
        }
        Value::Managed(managed) => {
            managed.add_owner(owner);
            Value::Managed(managed)
        }
        Value::Record(fields) => {
            Value::Object(ObservedObject::from_record(registry, fields, Some(owner)))
        }
        other => other,
    }
}

/// Drop `owner`'s ownership of `value`, if `value` is observable.
pub(crate) fn release(value: &Value, owner: SubscriberId) {
    match value {
        Value::Object(object) => {
            object.remove_owner(owner);
        }
        Value::Managed(managed) => {
            managed.remove_owner(owner);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Subscriber;
    use crate::testing::Probe;
    use crate::value::record;

    #[test]
    fn wrap_is_idempotent() {
        let registry = Registry::new();
        let first = Probe::registered(&registry);
        let second = Probe::registered(&registry);

        let object =
            ObservedObject::wrap(&registry, record([("x", 1)]).into(), Some(first.id())).unwrap();
        assert_eq!(object.owner_count(), 1);

        let again =
            ObservedObject::wrap(&registry, Value::Object(object.clone()), Some(second.id()))
                .unwrap();
        assert!(again.ptr_eq(&object));
        assert_eq!(object.owner_count(), 2);
    }

    #[test]
    fn wrap_rejects_scalars() {
        let registry = Registry::new();
        assert!(ObservedObject::wrap(&registry, Value::from(1), None).is_none());
    }

    #[test]
    fn create_new_refuses_observed_values() {
        let registry = Registry::new();
        let object = ObservedObject::create_new(&registry, record([("x", 1)]).into(), None)
            .expect("record is observable");
        assert_eq!(
            ObservedObject::create_new(&registry, Value::Object(object), None).unwrap_err(),
            StateError::AlreadyObserved
        );
        assert_eq!(
            ObservedObject::create_new(&registry, Value::from("s"), None).unwrap_err(),
            StateError::NotAnObject { found: "text" }
        );
    }

    #[test]
    fn field_write_notifies_owners() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let object =
            ObservedObject::wrap(&registry, record([("x", 1)]).into(), Some(owner.id())).unwrap();

        assert_eq!(object.get("x"), Some(Value::from(1)));
        assert!(object.set("x", 2));
        assert_eq!(object.get("x"), Some(Value::from(2)));
        assert_eq!(owner.change_count(), 1);
        assert_eq!(owner.labels(), vec![Some("x".to_owned())]);
        assert_eq!(owner.changes()[0], Value::Object(object.clone()));
    }

    #[test]
    fn unchanged_field_write_is_silent() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let object =
            ObservedObject::wrap(&registry, record([("x", 1)]).into(), Some(owner.id())).unwrap();
        assert!(!object.set("x", 1));
        assert_eq!(owner.change_count(), 0);
    }

    #[test]
    fn removing_a_field_notifies() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let object =
            ObservedObject::wrap(&registry, record([("x", 1)]).into(), Some(owner.id())).unwrap();
        assert_eq!(object.remove("x"), Some(Value::from(1)));
        assert_eq!(object.remove("x"), None);
        assert_eq!(owner.change_count(), 1);
    }

    #[test]
    fn last_owner_removal_keeps_wrapper_usable() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let object =
            ObservedObject::wrap(&registry, record([("x", 1)]).into(), Some(owner.id())).unwrap();
        assert!(object.remove_owner(owner.id()));
        assert!(!object.remove_owner(owner.id()));
        assert_eq!(object.owner_count(), 0);
        assert!(object.set("x", 5));
        assert_eq!(object.raw(), record([("x", 5)]));
        assert_eq!(owner.change_count(), 0);
    }

    #[test]
    fn claim_and_release_move_ownership() {
        let registry = Registry::new();
        let owner = registry.allocate();
        let claimed = claim(&registry, record([("x", 1)]).into(), owner);
        let object = claimed.as_object().expect("records are wrapped").clone();
        assert!(object.has_owner(owner));
        release(&claimed, owner);
        assert!(!object.has_owner(owner));
    }
}
