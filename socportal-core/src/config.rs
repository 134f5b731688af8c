//! Configuration management
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! `SOCPORTAL__SECTION__KEY` environment overrides.

use crate::error::{ErrorContext, PortalError, PortalResult};
use crate::types::PortalKind;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "SOCPORTAL";

/// Complete client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalConfig {
    pub portal: PortalKind,
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub routes: RouteConfig,
}

/// Backend API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every request path is joined onto
    pub base_url: String,
    /// Transport timeout applied to every request, refreshes included
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub token_path: String,
    pub profile_path: String,
    pub refresh_path: String,
    pub refresh_method: RefreshMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefreshMethod {
    Get,
    Post,
}

/// Session lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// A token whose `exp` is closer than this is refreshed proactively
    pub refresh_threshold_seconds: u64,
    /// Minimum time between two refresh attempts
    pub refresh_cooldown_seconds: u64,
    pub storage_namespace: String,
    pub storage_version: u32,
    /// Encrypt the persisted session; portal default when unset
    pub encrypt_storage: Option<bool>,
    /// Environment variable holding the storage passphrase
    pub encryption_key_env: String,
}

/// Navigation targets used by the request pipeline and route guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub login: String,
    pub logout: String,
    pub access_denied: String,
    /// Locations on which a 401 does not trigger a redirect
    pub auth_pages: Vec<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::for_portal(PortalKind::Admin)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_seconds: 30,
            user_agent: format!("socportal/{}", env!("CARGO_PKG_VERSION")),
            token_path: "/auth/token".to_string(),
            profile_path: "/auth/me".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            refresh_method: RefreshMethod::Post,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_seconds: 3600,
            refresh_cooldown_seconds: 30,
            storage_namespace: "socportal".to_string(),
            storage_version: 1,
            encrypt_storage: None,
            encryption_key_env: "SOCPORTAL_STORAGE_KEY".to_string(),
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            logout: "/logout".to_string(),
            access_denied: "/access-denied".to_string(),
            auth_pages: vec!["/login".to_string(), "/logout".to_string()],
        }
    }
}

impl RouteConfig {
    /// Whether `location` (path, optionally with a query) is one of the auth pages
    pub fn is_auth_page(&self, location: &str) -> bool {
        let path = location.split(['?', '#']).next().unwrap_or_default();
        let path = path.trim_end_matches('/');
        self.auth_pages
            .iter()
            .any(|page| page.trim_end_matches('/') == path)
    }
}

impl PortalConfig {
    /// Defaults for a given portal
    pub fn for_portal(portal: PortalKind) -> Self {
        Self {
            portal,
            api: ApiConfig::default(),
            session: SessionConfig::default(),
            routes: RouteConfig::default(),
        }
    }

    /// Versioned storage key the session record lives under
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:v{}:session",
            self.session.storage_namespace, self.portal, self.session.storage_version
        )
    }

    /// Whether the persisted session should go through the encryption adapter
    pub fn encrypt_storage(&self) -> bool {
        self.session
            .encrypt_storage
            .unwrap_or_else(|| self.portal.encrypts_by_default())
    }

    /// Load configuration: defaults, then `path` (if any), then environment overrides
    pub fn load(path: Option<&Path>) -> PortalResult<Self> {
        let mut builder = Config::builder().add_source(defaults_source()?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: PortalConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PortalError::Config {
                message: format!("Failed to load configuration: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("config")
                    .with_operation("load")
                    .with_suggestion("Check TOML syntax and SOCPORTAL__* environment variables"),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file on top of the defaults, ignoring the environment
    pub fn from_file<P: AsRef<Path>>(path: P) -> PortalResult<Self> {
        let path = path.as_ref();
        let config: PortalConfig = Config::builder()
            .add_source(defaults_source()?)
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PortalError::Config {
                message: format!("Failed to read config file {}: {}", path.display(), e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("config")
                    .with_operation("read_file")
                    .with_suggestion("Check if the config file exists and is valid TOML"),
            })?;

        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> PortalResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| PortalError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content).map_err(|e| PortalError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> PortalResult<()> {
        match url::Url::parse(&self.api.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(invalid(
                    "api.base_url",
                    &format!("Unsupported URL scheme '{}'", url.scheme()),
                    "Use an http:// or https:// URL",
                ));
            }
            Err(e) => {
                return Err(invalid(
                    "api.base_url",
                    &format!("Invalid base URL '{}': {}", self.api.base_url, e),
                    "Set api.base_url to the backend API root, e.g. https://soc.example.com/api",
                ));
            }
        }

        if self.api.timeout_seconds == 0 {
            return Err(invalid(
                "api.timeout_seconds",
                "Request timeout must be greater than 0",
                "Set api.timeout_seconds to a positive value",
            ));
        }

        for (field, path) in [
            ("api.token_path", &self.api.token_path),
            ("api.profile_path", &self.api.profile_path),
            ("api.refresh_path", &self.api.refresh_path),
            ("routes.login", &self.routes.login),
            ("routes.logout", &self.routes.logout),
            ("routes.access_denied", &self.routes.access_denied),
        ] {
            if !path.starts_with('/') {
                return Err(invalid(
                    field,
                    &format!("Path '{}' must start with '/'", path),
                    "Use an absolute path",
                ));
            }
        }

        if self.session.refresh_threshold_seconds == 0 {
            return Err(invalid(
                "session.refresh_threshold_seconds",
                "Refresh threshold must be greater than 0",
                "Set session.refresh_threshold_seconds to a positive value",
            ));
        }

        if self.session.refresh_cooldown_seconds == 0 {
            return Err(invalid(
                "session.refresh_cooldown_seconds",
                "Refresh cooldown must be greater than 0",
                "Set session.refresh_cooldown_seconds to a positive value",
            ));
        }

        if self.session.storage_namespace.trim().is_empty() {
            return Err(invalid(
                "session.storage_namespace",
                "Storage namespace cannot be empty",
                "Set session.storage_namespace, e.g. socportal",
            ));
        }

        Ok(())
    }

    /// Default config file location (`<config dir>/socportal/config.toml`)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("socportal")
            .join("config.toml")
    }

    /// Directory holding the persisted session (`<data dir>/socportal`)
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".socportal")))
            .unwrap_or_else(|| PathBuf::from(".socportal"))
            .join("socportal")
    }
}

fn defaults_source() -> PortalResult<Config> {
    Config::try_from(&PortalConfig::default()).map_err(|e| PortalError::Config {
        message: format!("Failed to build default configuration: {}", e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("config").with_operation("defaults"),
    })
}

fn invalid(field: &str, message: &str, suggestion: &str) -> PortalError {
    PortalError::Validation {
        message: message.to_string(),
        field: Some(field.to_string()),
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}
