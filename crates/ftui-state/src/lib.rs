#![forbid(unsafe_code)]

//! State: observable properties, linked views, and app-wide stores.
//!
//! A property reports every read and every value change to its subscribers,
//! synchronously. Links and projections chain properties together, and a
//! [`Store`] hands them out by key. The renderer is just another
//! [`Subscriber`]: it learns which properties a view read during a render
//! pass and which ones changed since.
//!
//! ```
//! use ftui_state::{ObservableProperty, Registry, Store, Value};
//!
//! let registry = Registry::new();
//! let store = Store::with_seed(&registry, [("count", 0)]);
//!
//! let link = store.link("count", None, Some("n")).unwrap();
//! link.write(Value::from(5));
//! assert_eq!(store.get("count"), Some(Value::from(5)));
//!
//! let projection = store.prop("count", None, None).unwrap();
//! projection.write(Value::from(9));
//! assert_eq!(store.get("count"), Some(Value::from(5)));
//! ```
//!
//! Everything is single-threaded (`Rc`/`RefCell`); a host that drives the
//! engine from several threads must serialize its calls.

pub mod environment;
pub mod error;
pub mod observed;
pub mod persistence;
pub mod property;
pub mod registry;
pub mod store;
pub mod subscriber;
pub mod sync;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use environment::{
    ColorMode, Environment, EnvironmentBackend, EnvironmentCallback, EnvironmentKey,
    LayoutDirection,
};
pub use error::{Result, StateError};
pub use observed::{ManagedObservable, ManagedRef, ObservedObject};
pub use persistence::{
    MemoryBackend, PersistenceBackend, PersistenceConfig, PersistentStorage, WritePolicy,
};
pub use property::{
    ObjectProperty, ObservableProperty, PropertyBase, PropertyRef, ScalarProperty,
    create_property,
};
pub use registry::{Registry, Subscriber, SubscriberId, SubscriberSet};
pub use store::{AppStorage, Store, StoreRegistry};
pub use subscriber::{CallbackSubscriber, CallbackSubscriberBuilder};
pub use sync::{NestedObjectLink, ObjectLink, ScalarLink, ScalarProjection};
pub use value::{Record, Shape, Value, record};
