#![forbid(unsafe_code)]

//! Recording subscriber shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::registry::{Registry, Subscriber, SubscriberId};
use crate::value::Value;

pub(crate) struct Probe {
    id: SubscriberId,
    changes: RefCell<Vec<Value>>,
    labels: RefCell<Vec<Option<String>>>,
    reads: Cell<usize>,
}

impl Probe {
    /// A probe with a fresh id that is not yet registered.
    pub(crate) fn new(registry: &Registry) -> Rc<Self> {
        Rc::new(Self {
            id: registry.allocate(),
            changes: RefCell::new(Vec::new()),
            labels: RefCell::new(Vec::new()),
            reads: Cell::new(0),
        })
    }

    pub(crate) fn registered(registry: &Registry) -> Rc<Self> {
        let probe = Self::new(registry);
        assert!(registry.register(&probe));
        probe
    }

    pub(crate) fn changes(&self) -> Vec<Value> {
        self.changes.borrow().clone()
    }

    pub(crate) fn change_count(&self) -> usize {
        self.changes.borrow().len()
    }

    pub(crate) fn labels(&self) -> Vec<Option<String>> {
        self.labels.borrow().clone()
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl Subscriber for Probe {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn has_changed(&self, value: &Value) {
        self.changes.borrow_mut().push(value.clone());
    }

    fn property_has_changed(&self, label: Option<&str>) {
        self.labels.borrow_mut().push(label.map(str::to_owned));
    }

    fn property_read(&self, _label: Option<&str>) {
        self.reads.set(self.reads.get() + 1);
    }
}
