#![forbid(unsafe_code)]

use std::cell::Cell;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::property::{ObservableProperty, PropertyBase, PropertyRef};
use crate::registry::{Subscriber, SubscriberId};
use crate::value::{Shape, Value};

/// Two-way link to a scalar property.
///
/// Holds no value of its own: reads and writes go to the source, and the
/// source's changes are re-broadcast to the link's subscribers.
pub struct ScalarLink {
    base: PropertyBase,
    this: Weak<ScalarLink>,
    source: PropertyRef,
    forwarding: Cell<bool>,
}

impl ScalarLink {
    /// Link to `source`, subscribing to it. `owner` becomes the link's first
    /// subscriber.
    pub fn new(source: PropertyRef, owner: Option<SubscriberId>, label: Option<&str>) -> Rc<Self> {
        let registry = source.base().registry().clone();
        let link = Rc::new_cyclic(|this| Self {
            base: PropertyBase::new(&registry, label),
            this: this.clone(),
            source,
            forwarding: Cell::new(false),
        });
        registry.register(&link);
        if let Some(owner) = owner {
            link.base.subscribe(owner);
        }
        link.source.subscribe(link.base.id());
        trace!(
            property = %link.base.id(),
            source = %link.source.id(),
            label = link.base.describe(),
            "scalar link created"
        );
        link
    }

    /// The property this link writes through to.
    #[must_use]
    pub fn source(&self) -> &PropertyRef {
        &self.source
    }
}

impl Subscriber for ScalarLink {
    fn id(&self) -> SubscriberId {
        self.base.id()
    }

    fn has_changed(&self, value: &Value) {
        if self.forwarding.get() || !self.base.is_active() {
            return;
        }
        self.base.notify_changed(value);
    }
}

impl ObservableProperty for ScalarLink {
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
        self.source.peek()
    }

    fn read(&self) -> Value {
        self.base.notify_read();
        self.source.read()
    }

    fn write(&self, value: Value) -> bool {
        if let Err(err) = self.base.check_write(&value, Shape::Scalar) {
            warn!(property = %self.base.id(), %err, "link write rejected");
            return false;
        }
        if !self.source.is_active() {
            warn!(
                property = %self.base.id(),
                source = %self.source.id(),
                "link source has been torn down"
            );
            return false;
        }
        if self.source.peek() == value {
            trace!(property = %self.base.id(), label = self.base.describe(), "write without change");
            return true;
        }
        self.base.notify_changed(&value);
        self.forwarding.set(true);
        let accepted = self.source.write(value);
        self.forwarding.set(false);
        accepted
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
    use crate::property::ScalarProperty;
    use crate::registry::Registry;
    use crate::testing::Probe;

    struct Fixture {
        registry: Registry,
        source: Rc<ScalarProperty>,
        source_owner: Rc<Probe>,
    }

    fn fixture() -> Fixture {
        let registry = Registry::new();
        let source_owner = Probe::registered(&registry);
        let source =
            ScalarProperty::new(&registry, 1, Some(source_owner.id()), Some("source")).unwrap();
        Fixture {
            registry,
            source,
            source_owner,
        }
    }

    #[test]
    fn link_subscribes_to_source() {
        let f = fixture();
        let owner = Probe::registered(&f.registry);
        let link = f.source.create_link(Some(owner.id()), Some("l")).unwrap();
        assert_eq!(f.source.subscriber_count(), 2);
        assert_eq!(link.subscriber_count(), 1);
        assert_eq!(link.shape(), Shape::Scalar);
    }

    #[test]
    fn write_reaches_source_with_one_notification_each() {
        let f = fixture();
        let owner = Probe::registered(&f.registry);
        let link = f.source.create_link(Some(owner.id()), Some("l")).unwrap();

        assert!(link.write(Value::from(7)));
        assert_eq!(f.source.peek(), Value::from(7));
        assert_eq!(link.peek(), Value::from(7));
        assert_eq!(owner.changes(), vec![Value::from(7)]);
        assert_eq!(f.source_owner.changes(), vec![Value::from(7)]);
        assert_eq!(owner.labels(), vec![Some("l".to_owned())]);
    }

    #[test]
    fn source_change_is_rebroadcast_under_link_label() {
        let f = fixture();
        let owner = Probe::registered(&f.registry);
        let link = f.source.create_link(Some(owner.id()), Some("l")).unwrap();

        f.source.write(Value::from(3));
        assert_eq!(owner.changes(), vec![Value::from(3)]);
        assert_eq!(owner.labels(), vec![Some("l".to_owned())]);
        assert_eq!(link.peek(), Value::from(3));
    }

    #[test]
    fn unchanged_write_is_silent() {
        let f = fixture();
        let owner = Probe::registered(&f.registry);
        let link = f.source.create_link(Some(owner.id()), None).unwrap();
        assert!(link.write(Value::from(1)));
        assert_eq!(owner.change_count(), 0);
        assert_eq!(f.source_owner.change_count(), 0);
    }

    #[test]
    fn read_is_tracked_on_both_ends() {
        let f = fixture();
        let owner = Probe::registered(&f.registry);
        let link = f.source.create_link(Some(owner.id()), None).unwrap();
        assert_eq!(link.read(), Value::from(1));
        assert_eq!(owner.reads(), 1);
        assert_eq!(f.source_owner.reads(), 1);
    }

    #[test]
    fn links_chain() {
        let f = fixture();
        let owner = Probe::registered(&f.registry);
        let first = f.source.create_link(None, Some("first")).unwrap();
        let second = first.create_link(Some(owner.id()), Some("second")).unwrap();

        second.write(Value::from("deep"));
        assert_eq!(f.source.peek(), Value::from("deep"));
        assert_eq!(owner.change_count(), 1);

        f.source.write(Value::from("up"));
        assert_eq!(second.peek(), Value::from("up"));
        assert_eq!(owner.change_count(), 2);
    }

    #[test]
    fn teardown_unsubscribes_from_source() {
        let f = fixture();
        let owner = Probe::registered(&f.registry);
        let link = f.source.create_link(Some(owner.id()), None).unwrap();
        link.teardown(Some(owner.id()));
        assert_eq!(f.source.subscriber_count(), 1);
        assert!(!link.is_active());
        assert!(!f.registry.contains(link.id()));

        assert!(!link.write(Value::from(2)));
        assert_eq!(f.source.peek(), Value::from(1));
        f.source.write(Value::from(4));
        assert_eq!(owner.change_count(), 0);
    }
}
