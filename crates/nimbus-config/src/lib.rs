pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that points straight at a settings file
pub const CONFIG_PATH_ENV: &str = "NIMBUS_CONFIG_PATH";

/// Prefix of environment overrides, e.g. `NIMBUS__PROVIDER__LAB__SECRET`
pub const ENV_PREFIX: &str = "NIMBUS";

const ENV_SEPARATOR: &str = "__";
const SETTINGS_FILE: &str = "nimbus.yaml";

/// Find the settings file
///
/// Search order:
/// 1. `NIMBUS_CONFIG_PATH`
/// 2. `./nimbus.yaml`
/// 3. `./.nimbus/nimbus.yaml`
/// 4. `~/.config/nimbus/nimbus.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points to a missing file: {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    let path = current_dir.join(SETTINGS_FILE);
    if path.exists() {
        return Ok(path);
    }

    let path = current_dir.join(".nimbus").join(SETTINGS_FILE);
    if path.exists() {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("nimbus").join(SETTINGS_FILE);
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::SettingsFileNotFound)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenStack Nova
    Nova,
    /// In-process provider, for local runs
    Memory,
}

/// `provider.<name>` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// Display name, defaults to the provider key
    #[serde(default)]
    pub name: Option<String>,
    /// Compute endpoint; Nova falls back to the Keystone service catalog
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub identity_endpoint: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub default_image_id: Option<String>,
    #[serde(default)]
    pub default_location_id: Option<String>,
}

impl ProviderSettings {
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(key)
    }
}

/// `inventory` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySettings {
    pub base_uri: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// `cache` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_active_ttl_secs")]
    pub active_ttl_secs: u64,
    #[serde(default = "default_transient_ttl_secs")]
    pub transient_ttl_secs: u64,
    #[serde(default = "default_inventory_ttl_secs")]
    pub inventory_ttl_secs: u64,
}

fn default_active_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_transient_ttl_secs() -> u64 {
    5
}

fn default_inventory_ttl_secs() -> u64 {
    5 * 60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            active_ttl_secs: default_active_ttl_secs(),
            transient_ttl_secs: default_transient_ttl_secs(),
            inventory_ttl_secs: default_inventory_ttl_secs(),
        }
    }
}

impl CacheSettings {
    pub fn active_ttl(&self) -> Duration {
        Duration::from_secs(self.active_ttl_secs)
    }

    pub fn transient_ttl(&self) -> Duration {
        Duration::from_secs(self.transient_ttl_secs)
    }

    pub fn inventory_ttl(&self) -> Duration {
        Duration::from_secs(self.inventory_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Providers to bind, in registry order
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub provider: BTreeMap<String, ProviderSettings>,
    /// Without this section an in-memory inventory is used
    #[serde(default)]
    pub inventory: Option<InventorySettings>,
    #[serde(default)]
    pub cache: CacheSettings,
}

impl Settings {
    /// Load from `path` (or the discovered settings file), apply
    /// environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => find_config_file()?,
        };
        tracing::debug!("Loading settings from {}", path.display());

        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .list_separator(",")
                    .with_list_parse_key("providers")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn provider_settings(&self, name: &str) -> Option<&ProviderSettings> {
        self.provider.get(name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.providers {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateProvider(name.clone()));
            }
            let section = self
                .provider_settings(name)
                .ok_or_else(|| ConfigError::MissingProviderSection(name.clone()))?;

            if section.kind == ProviderKind::Nova {
                let required = [
                    ("identity_endpoint", &section.identity_endpoint),
                    ("user", &section.user),
                    ("secret", &section.secret),
                    ("tenant", &section.tenant),
                    ("region", &section.region),
                    ("default_image_id", &section.default_image_id),
                ];
                for (field, value) in required {
                    if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                        return Err(ConfigError::MissingField {
                            provider: name.clone(),
                            field,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
