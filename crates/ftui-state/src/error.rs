#![forbid(unsafe_code)]

//! Error taxonomy for the state engine.
//!
//! Every recoverable failure is a [`StateError`]. Public operations come in
//! two forms: a `try_*` method that returns the error, and a plain method that
//! logs it through `tracing` and answers with `false`/`None`. Nothing in the
//! read/write/link path panics.

use thiserror::Error;

use crate::registry::SubscriberId;
use crate::value::Shape;

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("subscriber {id} is already registered")]
    AlreadyRegistered { id: SubscriberId },

    #[error("'{label}' expects a {expected} value, got {found}")]
    ShapeMismatch {
        label: String,
        expected: Shape,
        found: &'static str,
    },

    #[error("'{key}' cannot hold an absent value")]
    NoValue { key: String },

    #[error("no property named '{key}'")]
    KeyNotFound { key: String },

    #[error("write to '{key}' was rejected")]
    WriteRejected { key: String },

    #[error("'{key}' still has {subscribers} subscriber(s)")]
    KeyBusy { key: String, subscribers: usize },

    #[error("store cannot be cleared, busy keys: {}", .keys.join(", "))]
    StoreBusy { keys: Vec<String> },

    #[error("property {id} ('{label}') does not support {operation}")]
    Unsupported {
        id: SubscriberId,
        label: String,
        operation: &'static str,
    },

    #[error("cannot project '{key}' from a {found} value")]
    NotProjectable { key: String, found: &'static str },

    #[error("property {id} ('{label}') has been torn down")]
    TornDown { id: SubscriberId, label: String },

    #[error("cannot observe a {found} value")]
    NotAnObject { found: &'static str },

    #[error("value is already observed; wrap it instead of constructing a new observer")]
    AlreadyObserved,

    #[error("store path '{path}' is already taken")]
    PathTaken { path: String },

    #[error("no store registered under '{path}'")]
    PathNotFound { path: String },

    #[error("'{key}' is already persisted")]
    AlreadyPersisted { key: String },

    #[error("'{key}' is already defined in app storage; environment value not used")]
    EnvironmentShadowed { key: String },

    #[error("failed to encode '{key}': {message}")]
    Encode { key: String, message: String },
}

impl StateError {
    /// Whether this failure is an expected no-op rather than a misuse.
    ///
    /// Benign failures are logged at `debug`, everything else at `warn`.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. } | Self::PathNotFound { .. })
    }
}

/// Collapse a fallible operation into the boolean form, logging the failure.
pub(crate) fn reported(operation: &'static str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            log_failure(operation, &err);
            false
        }
    }
}

/// Collapse a fallible operation into the optional form, logging the failure.
pub(crate) fn reported_opt<T>(operation: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            log_failure(operation, &err);
            None
        }
    }
}

fn log_failure(operation: &'static str, err: &StateError) {
    if err.is_benign() {
        tracing::debug!(operation, %err, "state operation skipped");
    } else {
        tracing::warn!(operation, %err, "state operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_busy_lists_keys() {
        let err = StateError::StoreBusy {
            keys: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "store cannot be cleared, busy keys: a, b");
    }

    #[test]
    fn missing_key_is_benign() {
        assert!(StateError::KeyNotFound { key: "x".into() }.is_benign());
        assert!(
            !StateError::KeyBusy {
                key: "x".into(),
                subscribers: 1
            }
            .is_benign()
        );
    }
}
