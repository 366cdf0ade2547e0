#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::error::Result;
use crate::observed::{claim, release};
use crate::property::{ObservableProperty, PropertyBase, PropertyRef};
use crate::registry::{Subscriber, SubscriberId};
use crate::value::{Shape, Value};

/// Two-way link to an object property.
///
/// Besides subscribing to the source, the link is an owner of the object the
/// source currently holds. Whenever the source's object is replaced, by a
/// write through this link or directly, the ownership moves with it.
pub struct ObjectLink {
    base: PropertyBase,
    this: Weak<ObjectLink>,
    source: PropertyRef,
    owned: RefCell<Value>,
    forwarding: Cell<bool>,
}

impl ObjectLink {
    pub fn new(source: PropertyRef, owner: Option<SubscriberId>, label: Option<&str>) -> Rc<Self> {
        let registry = source.base().registry().clone();
        let link = Rc::new_cyclic(|this| Self {
            base: PropertyBase::new(&registry, label),
            this: this.clone(),
            source,
            owned: RefCell::new(Value::Null),
            forwarding: Cell::new(false),
        });
        registry.register(&link);
        if let Some(owner) = owner {
            link.base.subscribe(owner);
        }
        link.source.subscribe(link.base.id());
        link.own(link.source.peek());
        trace!(
            property = %link.base.id(),
            source = %link.source.id(),
            label = link.base.describe(),
            "object link created"
        );
        link
    }

    #[must_use]
    pub fn source(&self) -> &PropertyRef {
        &self.source
    }

    fn own(&self, value: Value) {
        let previous = self.owned.replace(Value::Null);
        release(&previous, self.base.id());
        let claimed = claim(self.base.registry(), value, self.base.id());
        self.owned.replace(claimed);
    }
}

impl Subscriber for ObjectLink {
    fn id(&self) -> SubscriberId {
        self.base.id()
    }

    fn has_changed(&self, _value: &Value) {
        if self.forwarding.get() || !self.base.is_active() {
            return;
        }
        let current = self.source.peek();
        let stale = *self.owned.borrow() != current;
        if stale {
            trace!(property = %self.base.id(), "source object replaced, moving ownership");
            self.own(current.clone());
        }
        self.base.notify_changed(&current);
    }
}

impl ObservableProperty for ObjectLink {
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
        self.source.peek()
    }

    fn read(&self) -> Value {
        self.base.notify_read();
        self.source.read()
    }

    fn write(&self, value: Value) -> bool {
        if let Err(err) = self.base.check_write(&value, Shape::Object) {
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
        release(&self.owned.replace(Value::Null), self.base.id());
        self.forwarding.set(true);
        let accepted = self.source.write(value);
        self.forwarding.set(false);
        let current = self.source.peek();
        self.own(current.clone());
        self.base.notify_changed(&current);
        accepted
    }

    fn try_create_projection(
        &self,
        _owner: Option<SubscriberId>,
        _label: Option<&str>,
    ) -> Result<PropertyRef> {
        Err(self.base.unsupported("one-way projection"))
    }

    fn teardown(&self, unlink: Option<SubscriberId>) {
        if self.base.is_active() {
            self.source.unsubscribe(self.base.id());
            release(&self.owned.replace(Value::Null), self.base.id());
        }
        self.base.release(unlink);
    }
}
