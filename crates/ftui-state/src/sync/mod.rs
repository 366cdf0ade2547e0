#![forbid(unsafe_code)]

//! Derived properties that mirror another property.
//!
//! - [`ScalarLink`] / [`ObjectLink`]: two-way links. Reads and writes pass
//!   through to the source; source changes are re-broadcast.
//! - [`ScalarProjection`]: a one-way projection caching the source's value.
//!   Local writes stay local.
//! - [`NestedObjectLink`]: a view onto a sub-object with no source property.
//!
//! Every variant is either active (subscribed to its source, usable) or torn
//! down (terminal). The transition is triggered only by
//! [`ObservableProperty::teardown`](crate::ObservableProperty::teardown).
//!
//! # Invariants
//!
//! 1. A variant with a source is subscribed to it exactly while active.
//! 2. A projection's write never reaches its source.
//! 3. Chained projections behave as repeated single-hop application.
//!
//! # Failure Modes
//!
//! - **Write cycles**: a subscriber that writes back into the property that
//!   notified it recurses without bound. Links guard against echoing their
//!   own forwarded writes; nothing else is detected.

mod nested;
mod object_link;
mod projection;
mod scalar_link;

pub use nested::NestedObjectLink;
pub use object_link::ObjectLink;
pub use projection::ScalarProjection;
pub use scalar_link::ScalarLink;
