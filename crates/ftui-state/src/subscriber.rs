#![forbid(unsafe_code)]

//! Closure-backed subscribers.
//!
//! Renderer bridges often want to react to a handful of properties without
//! defining a type. [`CallbackSubscriber`] adapts closures to the
//! [`Subscriber`] hooks.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use ftui_state::{CallbackSubscriber, Registry, Store, Subscriber};
//!
//! let registry = Registry::new();
//! let store = Store::with_seed(&registry, [("count", 0)]);
//! let dirty = Rc::new(Cell::new(false));
//! let flag = Rc::clone(&dirty);
//! let view = CallbackSubscriber::builder()
//!     .on_property_change(move |_| flag.set(true))
//!     .register(&registry);
//!
//! store.subscribe_to_changes_of("count", view.id());
//! store.set("count", 1);
//! assert!(dirty.get());
//! ```

use std::fmt;
use std::rc::Rc;

use crate::registry::{Registry, Subscriber, SubscriberId};
use crate::value::Value;

type ChangeFn = Box<dyn Fn(&Value)>;
type LabelFn = Box<dyn Fn(Option<&str>)>;

/// A [`Subscriber`] whose hooks are closures.
pub struct CallbackSubscriber {
    id: SubscriberId,
    registry: Registry,
    on_change: Option<ChangeFn>,
    on_property_change: Option<LabelFn>,
    on_read: Option<LabelFn>,
}

impl CallbackSubscriber {
    #[must_use]
    pub fn builder() -> CallbackSubscriberBuilder {
        CallbackSubscriberBuilder::default()
    }

    /// Remove this subscriber from its registry.
    pub fn unregister(&self) -> bool {
        self.registry.unregister(self.id)
    }
}

impl Subscriber for CallbackSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn has_changed(&self, value: &Value) {
        if let Some(f) = &self.on_change {
            f(value);
        }
    }

    fn property_has_changed(&self, label: Option<&str>) {
        if let Some(f) = &self.on_property_change {
            f(label);
        }
    }

    fn property_read(&self, label: Option<&str>) {
        if let Some(f) = &self.on_read {
            f(label);
        }
    }
}

impl fmt::Debug for CallbackSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSubscriber")
            .field("id", &self.id)
            .field("on_change", &self.on_change.is_some())
            .field("on_property_change", &self.on_property_change.is_some())
            .field("on_read", &self.on_read.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct CallbackSubscriberBuilder {
    on_change: Option<ChangeFn>,
    on_property_change: Option<LabelFn>,
    on_read: Option<LabelFn>,
}

impl CallbackSubscriberBuilder {
    #[must_use]
    pub fn on_change(mut self, f: impl Fn(&Value) + 'static) -> Self {
        self.on_change = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_property_change(mut self, f: impl Fn(Option<&str>) + 'static) -> Self {
        self.on_property_change = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_read(mut self, f: impl Fn(Option<&str>) + 'static) -> Self {
        self.on_read = Some(Box::new(f));
        self
    }

    /// Allocate an id and register the subscriber under it.
    ///
    /// The registry does not keep the subscriber alive; hold the returned
    /// handle for as long as notifications should arrive.
    pub fn register(self, registry: &Registry) -> Rc<CallbackSubscriber> {
        let subscriber = Rc::new(CallbackSubscriber {
            id: registry.allocate(),
            registry: registry.clone(),
            on_change: self.on_change,
            on_property_change: self.on_property_change,
            on_read: self.on_read,
        });
        registry.register(&subscriber);
        subscriber
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{ObservableProperty, ScalarProperty};
    use std::cell::RefCell;

    #[test]
    fn hooks_receive_notifications() {
        let registry = Registry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        let view = CallbackSubscriber::builder()
            .on_change(move |v| a.borrow_mut().push(format!("change {v:?}")))
            .on_property_change(move |l| b.borrow_mut().push(format!("prop {l:?}")))
            .on_read(move |l| c.borrow_mut().push(format!("read {l:?}")))
            .register(&registry);

        let count = ScalarProperty::new(&registry, 0, Some(view.id()), Some("n")).unwrap();
        count.read();
        count.write(Value::from(1));
        assert_eq!(
            *log.borrow(),
            vec![
                "read Some(\"n\")".to_owned(),
                "change Number(1.0)".to_owned(),
                "prop Some(\"n\")".to_owned(),
            ]
        );
    }

    #[test]
    fn missing_hooks_are_no_ops_and_unregister_works() {
        let registry = Registry::new();
        let view = CallbackSubscriber::builder().register(&registry);
        let count = ScalarProperty::new(&registry, 0, Some(view.id()), None).unwrap();
        assert!(count.write(Value::from(2)));
        assert!(view.unregister());
        assert!(!registry.contains(view.id()));
    }
}
