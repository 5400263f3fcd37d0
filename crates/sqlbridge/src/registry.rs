//! Named driver registry with runtime selection.
//!
//! Factories are consulted in order. Extension entries registered after
//! construction are consulted before the built-ins and shadow a built-in
//! with the same name.

use std::sync::Arc;

use sqlbridge_core::{DriverFactory, Error, Result};
use sqlbridge_mysql::MysqlDriverFactory;

/// The driver used when nothing else is configured or when a configured
/// driver cannot connect.
pub const DEFAULT_DRIVER: &str = "mysql";

/// Ordered driver factory table.
#[derive(Clone)]
pub struct DriverRegistry {
    entries: Vec<(String, Arc<dyn DriverFactory>)>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DriverRegistry {
    /// Registry with the built-in drivers.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .entries
            .push((DEFAULT_DRIVER.to_string(), Arc::new(MysqlDriverFactory)));
        registry
    }

    /// Registry with no drivers at all.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register an extension factory.
    ///
    /// Extensions are consulted before anything registered earlier, so an
    /// extension with a built-in's name shadows the built-in.
    pub fn register(&mut self, factory: Arc<dyn DriverFactory>) {
        let name = factory.name().to_string();
        self.entries.insert(0, (name, factory));
    }

    /// Look up a factory by name. The first (most recently registered)
    /// match wins.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DriverFactory>> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, factory)| Arc::clone(factory))
    }

    /// Registered names in consultation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Select the factory to use.
    ///
    /// An explicit override wins only when it is registered and its
    /// support probe passes; otherwise the first supported factory in
    /// consultation order is chosen.
    pub fn current(&self, override_name: Option<&str>) -> Result<Arc<dyn DriverFactory>> {
        if let Some(name) = override_name {
            match self.get(name) {
                Some(factory) if factory.is_supported() => return Ok(factory),
                Some(_) => {
                    tracing::warn!(driver = name, "configured driver is not supported here");
                }
                None => {
                    tracing::warn!(driver = name, "configured driver is not registered");
                }
            }
        }

        self.entries
            .iter()
            .find(|(_, factory)| factory.is_supported())
            .map(|(_, factory)| Arc::clone(factory))
            .ok_or_else(|| {
                Error::NoDriver("no registered driver passed its support probe".to_string())
            })
    }
}
