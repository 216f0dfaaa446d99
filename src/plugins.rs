//! Plugin loading hook run by the request gate.

use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plugin {name} failed to load: {reason}")]
pub struct PluginError {
    pub name: String,
    pub reason: String,
}

pub trait PluginLoader: Send + Sync {
    /// Load the plugins enabled in configuration.
    ///
    /// # Errors
    /// Returns [`PluginError`] for the first plugin that cannot be loaded.
    fn load_all(&self, enabled: &[String]) -> Result<(), PluginError>;
}

#[derive(Clone, Debug)]
pub struct NoopPluginLoader;

impl PluginLoader for NoopPluginLoader {
    fn load_all(&self, _enabled: &[String]) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Loader backed by a fixed set of plugins compiled into the binary.
#[derive(Clone, Debug, Default)]
pub struct BuiltinPluginLoader {
    available: BTreeSet<String>,
}

impl BuiltinPluginLoader {
    #[must_use]
    pub fn new<I, S>(available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: available.into_iter().map(Into::into).collect(),
        }
    }
}

impl PluginLoader for BuiltinPluginLoader {
    fn load_all(&self, enabled: &[String]) -> Result<(), PluginError> {
        for name in enabled {
            if !self.available.contains(name) {
                return Err(PluginError {
                    name: name.clone(),
                    reason: "not installed".to_string(),
                });
            }
            debug!(plugin = %name, "plugin loaded");
        }
        Ok(())
    }
}
