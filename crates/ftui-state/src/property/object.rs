#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use super::{ObservableProperty, PropertyBase, PropertyRef, check_shape};
use crate::error::Result;
use crate::observed::{claim, release};
use crate::registry::{Registry, Subscriber, SubscriberId};
use crate::value::{Shape, Value};

/// An owned object value.
///
/// Plain records are wrapped into an [`ObservedObject`](crate::ObservedObject)
/// on adoption; already observed objects and managed observables are held as
/// is. The property is an owner of whatever it holds, so a field write on the
/// object re-surfaces as a change of this property.
pub struct ObjectProperty {
    base: PropertyBase,
    this: Weak<ObjectProperty>,
    value: RefCell<Value>,
}

impl ObjectProperty {
    pub fn new(
        registry: &Registry,
        value: impl Into<Value>,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Result<Rc<Self>> {
        let value = value.into();
        check_shape(&value, Shape::Object, label)?;
        let property = Rc::new_cyclic(|this| Self {
            base: PropertyBase::new(registry, label),
            this: this.clone(),
            value: RefCell::new(Value::Null),
        });
        registry.register(&property);
        property.adopt(value);
        if let Some(owner) = owner {
            property.base.subscribe(owner);
        }
        trace!(property = %property.base.id(), label = property.base.describe(), "object property created");
        Ok(property)
    }

    /// Swap the held object, moving this property's ownership with it.
    fn adopt(&self, value: Value) {
        let previous = self.value.replace(Value::Null);
        release(&previous, self.base.id());
        let claimed = claim(self.base.registry(), value, self.base.id());
        self.value.replace(claimed);
    }
}

impl Subscriber for ObjectProperty {
    fn id(&self) -> SubscriberId {
        self.base.id()
    }

    /// A field of the held object changed.
    fn has_changed(&self, _object: &Value) {
        if !self.base.is_active() {
            return;
        }
        trace!(property = %self.base.id(), label = self.base.describe(), "nested field changed");
        self.base.notify_changed(&self.peek());
    }
}

impl ObservableProperty for ObjectProperty {
    fn base(&self) -> &PropertyBase {
        &self.base
    }

    fn handle(&self) -> Option<PropertyRef> {
        self.this.upgrade().map(|this| this as PropertyRef)
    }

    fn shape(&self) -> Shape {
        Shape::Object
    }

    fn peek(&self) -> Value {
        self.value.borrow().clone()
    }

    fn write(&self, value: Value) -> bool {
        if let Err(err) = self.base.check_write(&value, Shape::Object) {
            warn!(property = %self.base.id(), %err, "object write rejected");
            return false;
        }
        if *self.value.borrow() == value {
            trace!(property = %self.base.id(), label = self.base.describe(), "write without change");
            return true;
        }
        self.adopt(value);
        self.base.notify_changed(&self.peek());
        true
    }

    fn try_create_projection(
        &self,
        _owner: Option<SubscriberId>,
        _label: Option<&str>,
    ) -> Result<PropertyRef> {
        Err(self.base.unsupported("one-way projection"))
    }

    fn teardown(&self, unlink: Option<SubscriberId>) {
        if self.base.release(unlink) {
            release(&self.value.borrow(), self.base.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use crate::observed::ObservedObject;
    use crate::testing::Probe;
    use crate::value::record;

    fn point(registry: &Registry, owner: &Probe) -> Rc<ObjectProperty> {
        ObjectProperty::new(
            registry,
            record([("x", 1), ("y", 2)]),
            Some(owner.id()),
            Some("point"),
        )
        .unwrap()
    }

    #[test]
    fn records_are_wrapped_and_owned() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let point = point(&registry, &owner);
        let object = point.peek().as_object().cloned().unwrap();
        assert!(object.has_owner(point.id()));
        assert_eq!(object.owner_count(), 1);
    }

    #[test]
    fn nested_field_write_notifies_property_subscribers() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let point = point(&registry, &owner);
        let object = point.peek().as_object().cloned().unwrap();

        assert!(object.set("x", 10));
        assert_eq!(owner.change_count(), 1);
        assert_eq!(owner.changes()[0], point.peek());
        assert_eq!(owner.labels(), vec![Some("point".to_owned())]);
    }

    #[test]
    fn same_reference_write_is_silent() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let point = point(&registry, &owner);
        assert!(point.write(point.peek()));
        assert_eq!(owner.change_count(), 0);
    }

    #[test]
    fn replacing_the_object_moves_ownership() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let point = point(&registry, &owner);
        let old = point.peek().as_object().cloned().unwrap();

        assert!(point.write(record([("x", 5)]).into()));
        assert!(!old.has_owner(point.id()));
        assert_eq!(owner.change_count(), 1);

        old.set("x", 99);
        assert_eq!(owner.change_count(), 1);

        let new = point.peek().as_object().cloned().unwrap();
        new.set("x", 6);
        assert_eq!(owner.change_count(), 2);
    }

    #[test]
    fn already_observed_object_is_shared() {
        let registry = Registry::new();
        let object = ObservedObject::wrap(&registry, record([("x", 1)]).into(), None).unwrap();
        let a = ObjectProperty::new(&registry, object.clone(), None, Some("a")).unwrap();
        let b = ObjectProperty::new(&registry, object.clone(), None, Some("b")).unwrap();
        assert_eq!(a.peek(), b.peek());
        assert_eq!(object.owner_count(), 2);
    }

    #[test]
    fn scalar_write_is_rejected() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let point = point(&registry, &owner);
        assert!(!point.write(Value::from(1)));
        assert!(point.peek().is_observed());
    }

    #[test]
    fn projections_are_unsupported() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let point = point(&registry, &owner);
        assert!(matches!(
            point.try_create_projection(None, None),
            Err(StateError::Unsupported { .. })
        ));
        assert!(point.create_projection(None, None).is_none());
    }

    #[test]
    fn teardown_releases_the_object() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let point = point(&registry, &owner);
        let object = point.peek().as_object().cloned().unwrap();
        point.teardown(None);
        assert_eq!(object.owner_count(), 0);
        object.set("x", 3);
        assert_eq!(owner.change_count(), 0);
    }
}
