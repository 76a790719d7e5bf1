//! Global configuration for cgr-keyring
//!
//! Located at `~/.config/cgr-keyring/config.toml`

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Domain suffix a service host must end with to be handled
pub const DEFAULT_DOMAIN_SUFFIX: &str = ".cgr.dev";

/// External token tool invoked to issue tokens
pub const DEFAULT_TOOL: &str = "chainctl";

/// Outer timeout applied around a single issuance
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Package index the environment hook authenticates by default
pub const DEFAULT_HOOK_SERVICE: &str = "https://libraries.cgr.dev";

/// Username reported alongside issued tokens
pub const TOKEN_USERNAME: &str = "_token";

/// Global cgr-keyring configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub resolver: ResolverConfig,
    pub issuer: IssuerConfig,
    pub hook: HookConfig,
}

/// Settings for credential resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Hosts must end with this suffix (label boundary) to be handled
    pub domain_suffix: String,
    /// Seconds to wait for the token tool before killing it; 0 waits forever
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            domain_suffix: DEFAULT_DOMAIN_SUFFIX.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ResolverConfig {
    /// Outer issuance timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

/// Settings for the external token tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Executable name or path of the token tool
    pub tool: String,
    /// Fixed audience passed to the tool. When unset the service host is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            audience: None,
        }
    }
}

/// Services whose tokens are injected at environment setup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub targets: Vec<HookTarget>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            targets: vec![HookTarget::new(DEFAULT_HOOK_SERVICE, TOKEN_USERNAME)],
        }
    }
}

/// A single (service, account) pair resolved by the environment hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookTarget {
    pub service: String,
    #[serde(default = "default_account")]
    pub account: String,
    /// Variable receiving the token. Derived from the host when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

impl HookTarget {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
            env_var: None,
        }
    }

    pub fn with_env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = Some(env_var.into());
        self
    }
}

fn default_account() -> String {
    TOKEN_USERNAME.to_string()
}

impl GlobalConfig {
    /// Load global configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load global configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;

        tracing::debug!(
            "Loaded config from {:?}: suffix={} tool={}",
            path,
            config.resolver.domain_suffix,
            config.issuer.tool
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path, self.to_toml()?).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "cgr-keyring").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Reject values that would make every lookup fail or match everything
    pub fn validate(&self) -> Result<()> {
        let suffix = self.resolver.domain_suffix.trim().trim_start_matches('.');
        if suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "resolver.domain_suffix must not be empty".to_string(),
            ));
        }
        if self.issuer.tool.trim().is_empty() {
            return Err(ConfigError::Invalid("issuer.tool must not be empty".to_string()));
        }
        if let Some(target) = self.hook.targets.iter().find(|t| t.service.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "hook target for account '{}' has an empty service",
                target.account
            )));
        }
        Ok(())
    }
}
