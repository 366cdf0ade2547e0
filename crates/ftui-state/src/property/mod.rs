#![forbid(unsafe_code)]

//! Observable properties: single values with subscriber sets.
//!
//! Every property variant implements [`ObservableProperty`]. Reads fire the
//! `property_read` hook on every subscriber; writes that change the value fire
//! `has_changed` and `property_has_changed`, synchronously, before returning.
//!
//! Two owned variants live here:
//!
//! - [`ScalarProperty`]: bool, number or text; value equality.
//! - [`ObjectProperty`]: an observed object or managed observable; reference
//!   equality, and nested field writes re-surface as property changes.
//!
//! Derived variants (links, projections) live in [`crate::sync`].
//!
//! # Invariants
//!
//! 1. A property's id is registered for as long as the property is active.
//! 2. A scalar property never holds an object and vice versa; both
//!    construction and every write check the shape.
//! 3. Writing a value equal to the current one notifies nobody.
//! 4. `teardown` is one-way; afterwards writes are rejected.

mod object;
mod scalar;

pub use object::ObjectProperty;
pub use scalar::ScalarProperty;

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{Result, StateError, reported_opt};
use crate::registry::{Registry, Subscriber, SubscriberId, SubscriberSet};
use crate::sync::{ObjectLink, ScalarLink, ScalarProjection};
use crate::value::{Shape, Value};

/// Shared handle to any property variant.
pub type PropertyRef = Rc<dyn ObservableProperty>;

/// State common to every property variant.
#[derive(Debug)]
pub struct PropertyBase {
    id: SubscriberId,
    label: Option<String>,
    registry: Registry,
    subscribers: SubscriberSet,
    torn_down: Cell<bool>,
}

impl PropertyBase {
    pub(crate) fn new(registry: &Registry, label: Option<&str>) -> Self {
        Self {
            id: registry.allocate(),
            label: label.map(str::to_owned),
            registry: registry.clone(),
            subscribers: SubscriberSet::new(),
            torn_down: Cell::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Label for diagnostics.
    #[must_use]
    pub fn describe(&self) -> &str {
        self.label().unwrap_or("unknown")
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn subscribers(&self) -> &SubscriberSet {
        &self.subscribers
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.torn_down.get()
    }

    pub(crate) fn subscribe(&self, subscriber: SubscriberId) -> bool {
        let added = self.subscribers.insert(subscriber);
        if !added {
            trace!(property = %self.id, %subscriber, "already subscribed");
        }
        added
    }

    pub(crate) fn unsubscribe(&self, subscriber: SubscriberId) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if !removed {
            trace!(property = %self.id, %subscriber, "unsubscribe of non-subscriber");
        }
        removed
    }

    pub(crate) fn notify_changed(&self, value: &Value) {
        trace!(property = %self.id, label = self.describe(), "notifying change");
        self.subscribers
            .notify_changed(&self.registry, value, self.label());
    }

    pub(crate) fn notify_read(&self) {
        self.subscribers.notify_read(&self.registry, self.label());
    }

    /// Validate a write of `value` into a property of shape `expected`.
    pub(crate) fn check_write(&self, value: &Value, expected: Shape) -> Result<()> {
        if !self.is_active() {
            return Err(self.torn_down_error());
        }
        if value.shape() != Some(expected) {
            return Err(StateError::ShapeMismatch {
                label: self.describe().to_owned(),
                expected,
                found: value.kind(),
            });
        }
        Ok(())
    }

    pub(crate) fn torn_down_error(&self) -> StateError {
        StateError::TornDown {
            id: self.id,
            label: self.describe().to_owned(),
        }
    }

    pub(crate) fn unsupported(&self, operation: &'static str) -> StateError {
        StateError::Unsupported {
            id: self.id,
            label: self.describe().to_owned(),
            operation,
        }
    }

    /// Unregister and mark torn down. Returns `false` if already torn down.
    pub(crate) fn release(&self, unlink: Option<SubscriberId>) -> bool {
        if self.torn_down.replace(true) {
            debug!(property = %self.id, label = self.describe(), "teardown repeated");
            return false;
        }
        if let Some(subscriber) = unlink {
            self.subscribers.remove(subscriber);
        }
        self.registry.unregister(self.id);
        debug!(property = %self.id, label = self.describe(), "torn down");
        true
    }
}

/// Check a value's shape before constructing a property around it.
pub(crate) fn check_shape(value: &Value, expected: Shape, label: Option<&str>) -> Result<()> {
    if value.shape() == Some(expected) {
        Ok(())
    } else {
        Err(StateError::ShapeMismatch {
            label: label.unwrap_or("unknown").to_owned(),
            expected,
            found: value.kind(),
        })
    }
}

/// The common contract of every property variant.
pub trait ObservableProperty: Subscriber {
    fn base(&self) -> &PropertyBase;

    /// A shared handle to this property, while it is alive.
    fn handle(&self) -> Option<PropertyRef>;

    fn shape(&self) -> Shape;

    /// Current value, without read tracking.
    fn peek(&self) -> Value;

    /// Current value; every subscriber observes the read.
    fn read(&self) -> Value {
        self.base().notify_read();
        self.peek()
    }

    /// Replace the value, notifying subscribers if it changed.
    ///
    /// Returns whether the value was accepted. Writing the current value is
    /// accepted without notifying; a shape mismatch or a torn-down property
    /// is rejected and logged.
    fn write(&self, value: Value) -> bool;

    /// Release this property's identity and any upstream relationship.
    ///
    /// `unlink`, if given, is removed from the subscriber set first.
    fn teardown(&self, unlink: Option<SubscriberId>);

    fn try_create_link(
        &self,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Result<PropertyRef> {
        let base = self.base();
        let source = match self.handle() {
            Some(source) if base.is_active() => source,
            _ => return Err(base.torn_down_error()),
        };
        Ok(match self.shape() {
            Shape::Scalar => ScalarLink::new(source, owner, label) as PropertyRef,
            Shape::Object => ObjectLink::new(source, owner, label) as PropertyRef,
        })
    }

    /// A two-way link whose reads and writes pass through to this property.
    fn create_link(&self, owner: Option<SubscriberId>, label: Option<&str>) -> Option<PropertyRef> {
        reported_opt("create_link", self.try_create_link(owner, label))
    }

    fn try_create_projection(
        &self,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Result<PropertyRef> {
        let base = self.base();
        if self.shape() == Shape::Object {
            return Err(base.unsupported("one-way projection"));
        }
        let source = match self.handle() {
            Some(source) if base.is_active() => source,
            _ => return Err(base.torn_down_error()),
        };
        Ok(ScalarProjection::new(source, owner, label) as PropertyRef)
    }

    /// A one-way projection caching this property's value.
    fn create_projection(
        &self,
        owner: Option<SubscriberId>,
        label: Option<&str>,
    ) -> Option<PropertyRef> {
        reported_opt("create_projection", self.try_create_projection(owner, label))
    }

    fn label(&self) -> Option<&str> {
        self.base().label()
    }

    fn subscribe(&self, subscriber: SubscriberId) -> bool {
        self.base().subscribe(subscriber)
    }

    fn unsubscribe(&self, subscriber: SubscriberId) -> bool {
        self.base().unsubscribe(subscriber)
    }

    fn subscriber_count(&self) -> usize {
        self.base().subscribers().len()
    }

    fn is_active(&self) -> bool {
        self.base().is_active()
    }
}

/// Create an owned property whose variant matches the shape of `value`.
pub fn create_property(
    registry: &Registry,
    value: Value,
    owner: Option<SubscriberId>,
    label: Option<&str>,
) -> Result<PropertyRef> {
    match value.shape() {
        Some(Shape::Scalar) => Ok(ScalarProperty::new(registry, value, owner, label)? as PropertyRef),
        Some(Shape::Object) => Ok(ObjectProperty::new(registry, value, owner, label)? as PropertyRef),
        None => Err(StateError::NoValue {
            key: label.unwrap_or("unknown").to_owned(),
        }),
    }
}
