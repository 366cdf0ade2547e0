#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use super::{ObservableProperty, PropertyBase, PropertyRef, check_shape};
use crate::error::Result;
use crate::registry::{Registry, Subscriber, SubscriberId};
use crate::value::{Shape, Value};

/// An owned bool, number or text value.
pub struct ScalarProperty {
    base: PropertyBase,
    this: Weak<ScalarProperty>,
    value: RefCell<Value>,
}

impl ScalarProperty {
    /// Create and register a scalar property; `owner` becomes its first
    /// subscriber.
    pub fn new(
        registry: &Registry,
        value: impl Into<Value>,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Result<Rc<Self>> {
        let value = value.into();
        check_shape(&value, Shape::Scalar, label)?;
        let property = Rc::new_cyclic(|this| Self {
            base: PropertyBase::new(registry, label),
            this: this.clone(),
            value: RefCell::new(value),
        });
        registry.register(&property);
        if let Some(owner) = owner {
            property.base.subscribe(owner);
        }
        trace!(property = %property.base.id(), label = property.base.describe(), "scalar property created");
        Ok(property)
    }
}

impl Subscriber for ScalarProperty {
    fn id(&self) -> SubscriberId {
        self.base.id()
    }
}

impl ObservableProperty for ScalarProperty {
    fn base(&self) -> &PropertyBase {
        &self.base
    }

    fn handle(&self) -> Option<PropertyRef> {
        self.this.upgrade().map(|this| this as PropertyRef)
    }

    fn shape(&self) -> Shape {
        Shape::Scalar
    }

    fn peek(&self) -> Value {
        self.value.borrow().clone()
    }

    fn write(&self, value: Value) -> bool {
        if let Err(err) = self.base.check_write(&value, Shape::Scalar) {
            warn!(property = %self.base.id(), %err, "scalar write rejected");
            return false;
        }
        if *self.value.borrow() == value {
            trace!(property = %self.base.id(), label = self.base.describe(), "write without change");
            return true;
        }
        self.value.replace(value.clone());
        self.base.notify_changed(&value);
        true
    }

    fn teardown(&self, unlink: Option<SubscriberId>) {
        self.base.release(unlink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use crate::testing::Probe;
    use crate::value::record;

    fn counter(registry: &Registry, owner: &Probe) -> Rc<ScalarProperty> {
        ScalarProperty::new(registry, 0, Some(owner.id()), Some("count")).unwrap()
    }

    #[test]
    fn rejects_object_initial_value() {
        let registry = Registry::new();
        let err = ScalarProperty::new(&registry, record([("x", 1)]), None, Some("bad"))
            .err()
            .unwrap();
        assert_eq!(
            err,
            StateError::ShapeMismatch {
                label: "bad".into(),
                expected: Shape::Scalar,
                found: "record",
            }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn write_notifies_subscribers_once() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let count = counter(&registry, &owner);

        assert!(count.write(Value::from(5)));
        assert_eq!(count.peek(), Value::from(5));
        assert_eq!(owner.changes(), vec![Value::from(5)]);
        assert_eq!(owner.labels(), vec![Some("count".to_owned())]);
    }

    #[test]
    fn equal_write_is_silent() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let count = counter(&registry, &owner);
        assert!(count.write(Value::from(0)));
        assert_eq!(owner.change_count(), 0);
    }

    #[test]
    fn read_fires_read_hook_every_time() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let count = counter(&registry, &owner);
        assert_eq!(count.read(), Value::from(0));
        assert_eq!(count.read(), Value::from(0));
        assert_eq!(owner.reads(), 2);
        assert_eq!(count.peek(), Value::from(0));
        assert_eq!(owner.reads(), 2);
    }

    #[test]
    fn object_write_is_rejected() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let count = counter(&registry, &owner);
        assert!(!count.write(record([("x", 1)]).into()));
        assert_eq!(count.peek(), Value::from(0));
        assert_eq!(owner.change_count(), 0);
    }

    #[test]
    fn subscribe_and_unsubscribe_are_idempotent() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let count = counter(&registry, &owner);
        assert!(!count.subscribe(owner.id()));
        assert_eq!(count.subscriber_count(), 1);
        assert!(count.unsubscribe(owner.id()));
        assert!(!count.unsubscribe(owner.id()));
        count.write(Value::from(1));
        assert_eq!(owner.change_count(), 0);
    }

    #[test]
    fn teardown_unlinks_and_rejects_writes() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let count = counter(&registry, &owner);
        count.teardown(Some(owner.id()));
        assert_eq!(count.subscriber_count(), 0);
        assert!(!registry.contains(count.id()));
        assert!(!count.write(Value::from(9)));
        assert_eq!(count.peek(), Value::from(0));
    }
}
