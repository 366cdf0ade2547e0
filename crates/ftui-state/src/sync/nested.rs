#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::error::Result;
use crate::observed::{claim, release};
use crate::property::{ObservableProperty, PropertyBase, PropertyRef, check_shape};
use crate::registry::{Registry, Subscriber, SubscriberId};
use crate::value::{Shape, Value};

/// A view onto a sub-object, without a source property.
///
/// The link owns the sub-object's observer, so field writes on it notify the
/// link's subscribers. It can be observed further but not two-way linked.
pub struct NestedObjectLink {
    base: PropertyBase,
    this: Weak<NestedObjectLink>,
    value: RefCell<Value>,
}

impl NestedObjectLink {
    pub fn new(
        registry: &Registry,
        value: impl Into<Value>,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Result<Rc<Self>> {
        let value = value.into();
        check_shape(&value, Shape::Object, label)?;
        let link = Rc::new_cyclic(|this| Self {
            base: PropertyBase::new(registry, label),
            this: this.clone(),
            value: RefCell::new(Value::Null),
        });
        registry.register(&link);
        link.adopt(value);
        if let Some(owner) = owner {
            link.base.subscribe(owner);
        }
        trace!(property = %link.base.id(), label = link.base.describe(), "nested object link created");
        Ok(link)
    }

    fn adopt(&self, value: Value) {
        release(&self.value.replace(Value::Null), self.base.id());
        let claimed = claim(self.base.registry(), value, self.base.id());
        self.value.replace(claimed);
    }
}

impl Subscriber for NestedObjectLink {
    fn id(&self) -> SubscriberId {
        self.base.id()
    }

    fn has_changed(&self, _object: &Value) {
        if self.base.is_active() {
            self.base.notify_changed(&self.peek());
        }
    }
}

impl ObservableProperty for NestedObjectLink {
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
            warn!(property = %self.base.id(), %err, "nested link write rejected");
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

    fn try_create_link(
        &self,
        _owner: Option<SubscriberId>,
        _label: Option<&str>,
    ) -> Result<PropertyRef> {
        Err(self.base.unsupported("two-way link"))
    }

    fn teardown(&self, unlink: Option<SubscriberId>) {
        if self.base.release(unlink) {
            release(&self.value.borrow(), self.base.id());
        }
    }
}
