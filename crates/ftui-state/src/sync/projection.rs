#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::error::Result;
use crate::property::{ObservableProperty, PropertyBase, PropertyRef};
use crate::registry::{Subscriber, SubscriberId};
use crate::value::{Shape, Value};

/// One-way projection of a scalar property.
///
/// Caches the source's value. Source changes overwrite the cache; writes to
/// the projection only update the cache and its own subscribers.
pub struct ScalarProjection {
    base: PropertyBase,
    this: Weak<ScalarProjection>,
    source: PropertyRef,
    value: RefCell<Value>,
}

impl ScalarProjection {
    pub fn new(source: PropertyRef, owner: Option<SubscriberId>, label: Option<&str>) -> Rc<Self> {
        let registry = source.base().registry().clone();
        let initial = source.read();
        let projection = Rc::new_cyclic(|this| Self {
            base: PropertyBase::new(&registry, label),
            this: this.clone(),
            source,
            value: RefCell::new(initial),
        });
        registry.register(&projection);
        if let Some(owner) = owner {
            projection.base.subscribe(owner);
        }
        projection.source.subscribe(projection.base.id());
        trace!(
            property = %projection.base.id(),
            source = %projection.source.id(),
            label = projection.base.describe(),
            "projection created"
        );
        projection
    }

    #[must_use]
    pub fn source(&self) -> &PropertyRef {
        &self.source
    }
}

impl Subscriber for ScalarProjection {
    fn id(&self) -> SubscriberId {
        self.base.id()
    }

    fn has_changed(&self, value: &Value) {
        if self.base.is_active() {
            self.write(value.clone());
        }
    }
}

impl ObservableProperty for ScalarProjection {
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
            warn!(property = %self.base.id(), %err, "projection write rejected");
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

    fn try_create_link(
        &self,
        _owner: Option<SubscriberId>,
        _label: Option<&str>,
    ) -> Result<PropertyRef> {
        Err(self.base.unsupported("two-way link"))
    }

    fn teardown(&self, unlink: Option<SubscriberId>) {
        if self.base.is_active() {
            self.source.unsubscribe(self.base.id());
        }
        self.base.release(unlink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use crate::property::ScalarProperty;
    use crate::registry::Registry;
    use crate::testing::Probe;

    #[test]
    fn caches_source_value_and_tracks_the_read() {
        let registry = Registry::new();
        let source_owner = Probe::registered(&registry);
        let source =
            ScalarProperty::new(&registry, "a", Some(source_owner.id()), Some("s")).unwrap();
        let projection = source.create_projection(None, Some("p")).unwrap();
        assert_eq!(projection.peek(), Value::from("a"));
        assert_eq!(source_owner.reads(), 1);
    }

    #[test]
    fn source_writes_overwrite_the_cache() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let source = ScalarProperty::new(&registry, 1, None, Some("s")).unwrap();
        let projection = source.create_projection(Some(owner.id()), Some("p")).unwrap();

        source.write(Value::from(2));
        assert_eq!(projection.read(), Value::from(2));
        assert_eq!(owner.changes(), vec![Value::from(2)]);
        assert_eq!(owner.labels(), vec![Some("p".to_owned())]);
    }

    #[test]
    fn local_writes_stay_local() {
        let registry = Registry::new();
        let source_owner = Probe::registered(&registry);
        let owner = Probe::registered(&registry);
        let source =
            ScalarProperty::new(&registry, 1, Some(source_owner.id()), Some("s")).unwrap();
        let projection = source.create_projection(Some(owner.id()), Some("p")).unwrap();

        assert!(projection.write(Value::from(9)));
        assert_eq!(source.peek(), Value::from(1));
        assert_eq!(source_owner.change_count(), 0);
        assert_eq!(owner.change_count(), 1);

        source.write(Value::from(3));
        assert_eq!(projection.peek(), Value::from(3));
    }

    #[test]
    fn projections_chain_hop_by_hop() {
        let registry = Registry::new();
        let owner = Probe::registered(&registry);
        let source = ScalarProperty::new(&registry, 0, None, Some("s")).unwrap();
        let first = source.create_projection(None, Some("p1")).unwrap();
        let second = first.create_projection(Some(owner.id()), Some("p2")).unwrap();

        source.write(Value::from(4));
        assert_eq!(second.peek(), Value::from(4));

        first.write(Value::from(5));
        assert_eq!(second.peek(), Value::from(5));
        assert_eq!(source.peek(), Value::from(4));

        second.write(Value::from(6));
        assert_eq!(first.peek(), Value::from(5));
        assert_eq!(owner.change_count(), 3);
    }

    #[test]
    fn projections_refuse_two_way_links() {
        let registry = Registry::new();
        let source = ScalarProperty::new(&registry, 0, None, Some("s")).unwrap();
        let projection = source.create_projection(None, Some("p")).unwrap();
        assert!(matches!(
            projection.try_create_link(None, None),
            Err(StateError::Unsupported {
                operation: "two-way link",
                ..
            })
        ));
        assert!(projection.create_link(None, None).is_none());
        assert_eq!(projection.subscriber_count(), 0);
        assert!(projection.create_projection(None, None).is_some());
    }

    #[test]
    fn teardown_stops_updates() {
        let registry = Registry::new();
        let source = ScalarProperty::new(&registry, 0, None, Some("s")).unwrap();
        let projection = source.create_projection(None, None).unwrap();
        projection.teardown(None);
        assert_eq!(source.subscriber_count(), 0);
        source.write(Value::from(1));
        assert_eq!(projection.peek(), Value::from(0));
    }
}
