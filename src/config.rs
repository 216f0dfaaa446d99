//! Application configuration as seen by the authentication core.
//!
//! The persisted configuration is a JSON document. [`FileConfigSource`] keeps
//! a cached copy that is re-read on demand (page reloads) and written back on
//! version upgrades.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};
use tracing::{debug, info};

use crate::gate::maintenance::MaintenanceLock;

const DEFAULT_SESSION_TIMEOUT_SECONDS: i64 = 300;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigData {
    pub installed: bool,
    pub maintenance: bool,
    pub config_version: String,
    pub session_timeout: i64,
    pub ldap_enabled: bool,
    pub auth_basic_enabled: bool,
    pub https_enabled: bool,
    pub encrypt_session: bool,
    pub db_name: String,
    pub sso_default_group: i64,
    pub sso_default_profile: i64,
    /// User allowed in while maintenance is active; 0 for nobody.
    pub app_lock: i64,
    pub plugins: Vec<String>,
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            installed: false,
            maintenance: false,
            config_version: env!("CARGO_PKG_VERSION").to_string(),
            session_timeout: DEFAULT_SESSION_TIMEOUT_SECONDS,
            ldap_enabled: false,
            auth_basic_enabled: false,
            https_enabled: false,
            encrypt_session: false,
            db_name: "syspass".to_string(),
            sso_default_group: 0,
            sso_default_profile: 0,
            app_lock: 0,
            plugins: Vec::new(),
        }
    }
}

impl ConfigData {
    #[must_use]
    pub fn maintenance_lock(&self) -> MaintenanceLock {
        MaintenanceLock {
            locked_by_user_id: self.app_lock,
            is_active: self.maintenance,
        }
    }
}

/// Read access to configuration plus the reload/upgrade hooks the gate needs.
pub trait ConfigSource: Send + Sync {
    /// Snapshot of the current configuration.
    fn data(&self) -> ConfigData;

    /// Load the configuration; `reload` forces a re-read from storage.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read.
    fn load(&self, reload: bool) -> Result<()>;

    /// Replace and persist the configuration.
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, data: ConfigData) -> Result<()>;

    fn is_directory_enabled(&self) -> bool {
        self.data().ldap_enabled
    }

    fn is_basic_auth_enabled(&self) -> bool {
        self.data().auth_basic_enabled
    }

    fn session_timeout_seconds(&self) -> i64 {
        self.data().session_timeout
    }

    fn is_maintenance(&self) -> bool {
        self.data().maintenance
    }
}

#[derive(Debug)]
pub struct FileConfigSource {
    path: Option<PathBuf>,
    data: RwLock<ConfigData>,
    loaded: RwLock<bool>,
}

impl FileConfigSource {
    /// Open a JSON config file. A missing file yields defaults (not installed).
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = read_config(&path)?;
        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
            loaded: RwLock::new(true),
        })
    }

    /// Configuration held only in memory.
    #[must_use]
    pub fn from_data(data: ConfigData) -> Self {
        Self {
            path: None,
            data: RwLock::new(data),
            loaded: RwLock::new(true),
        }
    }

    fn write(&self, data: ConfigData) {
        match self.data.write() {
            Ok(mut guard) => *guard = data,
            Err(poisoned) => *poisoned.into_inner() = data,
        }
    }
}

fn read_config(path: &Path) -> Result<ConfigData> {
    if !path.exists() {
        debug!("config file {} not found, using defaults", path.display());
        return Ok(ConfigData::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

impl ConfigSource for FileConfigSource {
    fn data(&self) -> ConfigData {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn load(&self, reload: bool) -> Result<()> {
        let already_loaded = self.loaded.read().map(|g| *g).unwrap_or(false);
        if already_loaded && !reload {
            return Ok(());
        }
        if let Some(path) = &self.path {
            self.write(read_config(path)?);
            debug!("config reloaded from {}", path.display());
        }
        if let Ok(mut loaded) = self.loaded.write() {
            *loaded = true;
        }
        Ok(())
    }

    fn save(&self, data: ConfigData) -> Result<()> {
        if let Some(path) = &self.path {
            let raw = serde_json::to_string_pretty(&data).context("failed to serialize config")?;
            fs::write(path, raw)
                .with_context(|| format!("Failed to write config file: {}", path.display()))?;
            info!("config saved to {}", path.display());
        }
        self.write(data);
        Ok(())
    }
}

/// Compare dotted version strings numerically (`"3.2.10" > "3.2.9"`).
/// Non-numeric components count as 0.
#[must_use]
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .split(['.', '-'])
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (mut l, mut r) = (parse(left), parse(right));
    let len = l.len().max(r.len());
    l.resize(len, 0);
    r.resize(len, 0);
    l.cmp(&r)
}
