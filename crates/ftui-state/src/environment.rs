#![forbid(unsafe_code)]

//! Mirroring host settings into the app-wide store.
//!
//! [`Environment`] seeds app-store entries from an [`EnvironmentBackend`] and
//! keeps a one-way projection of each. The backend's change callback writes
//! new host values into the store, which fans out to every consumer.
//!
//! # Invariants
//!
//! 1. The host never overrides an application-defined key: if the store
//!    already has the key, [`Environment::env_prop`] does nothing.
//! 2. Host change callbacks only touch keys this environment mirrors.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::{debug, trace, warn};

use crate::error::{Result, StateError, reported};
use crate::property::{ObservableProperty, PropertyRef};
use crate::store::AppStorage;
use crate::value::Value;

/// Host settings with a dedicated backend getter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentKey {
    AccessibilityEnabled,
    ColorMode,
    FontScale,
    FontWeightScale,
    LayoutDirection,
    LanguageCode,
}

impl EnvironmentKey {
    pub const ALL: [Self; 6] = [
        Self::AccessibilityEnabled,
        Self::ColorMode,
        Self::FontScale,
        Self::FontWeightScale,
        Self::LayoutDirection,
        Self::LanguageCode,
    ];

    /// Store key under which the setting is mirrored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessibilityEnabled => "accessibilityEnabled",
            Self::ColorMode => "colorMode",
            Self::FontScale => "fontScale",
            Self::FontWeightScale => "fontWeightScale",
            Self::LayoutDirection => "layoutDirection",
            Self::LanguageCode => "languageCode",
        }
    }

    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == key)
    }
}

impl fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorMode {
    #[default]
    Light,
    Dark,
}

impl ColorMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl From<ColorMode> for Value {
    fn from(mode: ColorMode) -> Self {
        Value::from(mode.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayoutDirection {
    #[default]
    Ltr,
    Rtl,
    Auto,
}

impl LayoutDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ltr => "ltr",
            Self::Rtl => "rtl",
            Self::Auto => "auto",
        }
    }
}

impl From<LayoutDirection> for Value {
    fn from(direction: LayoutDirection) -> Self {
        Value::from(direction.as_str())
    }
}

/// Host callback receiving `(key, new value)`.
pub type EnvironmentCallback = Box<dyn Fn(&str, Value)>;

/// Synchronous view of the host's settings.
pub trait EnvironmentBackend {
    fn accessibility_enabled(&self) -> bool;
    fn color_mode(&self) -> ColorMode;
    fn font_scale(&self) -> f64;
    fn font_weight_scale(&self) -> f64;
    fn layout_direction(&self) -> LayoutDirection;
    fn language_code(&self) -> String;

    /// Install the callback the host invokes when a setting changes.
    fn on_value_changed(&self, callback: EnvironmentCallback);
}

/// Environment mirror over an [`AppStorage`].
pub struct Environment {
    app: AppStorage,
    backend: Rc<dyn EnvironmentBackend>,
    props: RefCell<AHashMap<String, PropertyRef>>,
}

impl Environment {
    pub fn new(app: &AppStorage, backend: Rc<dyn EnvironmentBackend>) -> Rc<Self> {
        let environment = Rc::new(Self {
            app: app.clone(),
            backend,
            props: RefCell::new(AHashMap::new()),
        });
        let weak: Weak<Self> = Rc::downgrade(&environment);
        environment
            .backend
            .on_value_changed(Box::new(move |key, value| {
                if let Some(environment) = weak.upgrade() {
                    environment.on_value_changed(key, value);
                }
            }));
        environment
    }

    /// Current host value of `key`.
    #[must_use]
    pub fn host_value(&self, key: EnvironmentKey) -> Value {
        let backend = &self.backend;
        match key {
            EnvironmentKey::AccessibilityEnabled => backend.accessibility_enabled().into(),
            EnvironmentKey::ColorMode => backend.color_mode().into(),
            EnvironmentKey::FontScale => backend.font_scale().into(),
            EnvironmentKey::FontWeightScale => {
                ((backend.font_weight_scale() * 100.0).round() / 100.0).into()
            }
            EnvironmentKey::LayoutDirection => backend.layout_direction().into(),
            EnvironmentKey::LanguageCode => backend.language_code().into(),
        }
    }

    /// Mirror `key` into the app store.
    ///
    /// Known keys take the host's value; any other key takes `default`.
    pub fn env_prop(&self, key: &str, default: impl Into<Value>) -> bool {
        reported("env_prop", self.try_env_prop(key, default))
    }

    pub fn try_env_prop(&self, key: &str, default: impl Into<Value>) -> Result<()> {
        if self.app.has(key) {
            return Err(StateError::EnvironmentShadowed {
                key: key.to_owned(),
            });
        }
        let value = match EnvironmentKey::parse(key) {
            Some(known) => self.host_value(known),
            None => default.into(),
        };
        let prop = self.app.try_set_and_prop(key, value, None, Some(key))?;
        self.props.borrow_mut().insert(key.to_owned(), prop);
        debug!(key, "environment value mirrored");
        Ok(())
    }

    /// Mirror several keys. Returns whether every key was mirrored.
    pub fn env_props<I, K, V>(&self, entries: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut all = true;
        for (key, default) in entries {
            all &= self.env_prop(key.as_ref(), default);
        }
        all
    }

    /// Mirrored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.props.borrow().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// The mirrored value of `key`.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<Value> {
        let prop = self.props.borrow().get(key).cloned()?;
        Some(prop.read())
    }

    fn on_value_changed(&self, key: &str, value: Value) {
        if !self.props.borrow().contains_key(key) {
            trace!(key, "host change for unmirrored key");
            return;
        }
        if self.app.set(key, value) {
            debug!(key, "environment value changed");
        } else {
            warn!(key, "environment change could not be applied");
        }
    }

    /// Release every projection and remove the mirrored app-store entries.
    ///
    /// An entry that still has other subscribers stays in the store.
    pub fn about_to_be_deleted(&self) {
        let props: Vec<(String, PropertyRef)> = self.props.borrow_mut().drain().collect();
        for (key, prop) in props {
            prop.teardown(None);
            if self.app.delete(&key) {
                trace!(key = key.as_str(), "environment value removed");
            }
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("keys", &self.keys())
            .finish()
    }
}
