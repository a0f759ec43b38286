//! Configuration loading and root folder resolution
//!
//! Root folder resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `OLAB_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the user/system TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! The root folder holds `olab.toml` (service configuration) and, for the
//! local backend, `olab.db`. Missing or unreadable TOML never stops startup:
//! a warning is logged and defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "OLAB_ROOT_FOLDER";

/// Name of the service configuration file inside the root folder
pub const CONFIG_FILE_NAME: &str = "olab.toml";

/// Name of the local database file inside the root folder
pub const DATABASE_FILE_NAME: &str = "olab.db";

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
        }
    }
}

/// Resolves the root folder from CLI, environment, config file or default
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
        }
    }

    /// Attach the command-line value (highest priority)
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(config_path) = find_user_config_file() {
            match std::fs::read_to_string(&config_path)
                .map_err(Error::from)
                .and_then(|content| toml::from_str::<toml::Value>(&content).map_err(Error::from))
            {
                Ok(config) => {
                    if let Some(root) = config.get("root_folder").and_then(|v| v.as_str()) {
                        return PathBuf::from(root);
                    }
                }
                Err(e) => {
                    warn!("Ignoring unreadable config file {}: {}", config_path.display(), e);
                }
            }
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and names the files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root_folder.join(CONFIG_FILE_NAME)
    }
}

/// Locate the user-level config file (`~/.config/olab/config.toml`), then the
/// system-wide one on Linux
fn find_user_config_file() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("olab").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/olab/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("olab"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\olab"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("olab"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/olab"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("olab"))
            .unwrap_or_else(|| PathBuf::from("./olab_data"))
    }
}

// ========================================
// Service configuration (olab.toml)
// ========================================

/// Where durable state lives
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// SQLite database inside the root folder
    #[default]
    Local,
    /// Hosted PostgREST + GoTrue style backend
    Hosted {
        /// Project base URL, e.g. `https://xyz.example.co`
        url: String,
        /// API key sent as `apikey` and bearer token
        api_key: String,
    },
}

impl BackendConfig {
    /// `local` or `hosted`, as written in `olab.toml`
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Local => "local",
            BackendConfig::Hosted { .. } => "hosted",
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// Labeling session tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sentences fetched per buffer window
    pub batch_size: usize,
    /// Timeout applied to every backend call
    pub request_timeout_secs: u64,
    /// Idle time after which an auth session is expired
    pub inactivity_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            request_timeout_secs: 30,
            inactivity_timeout_secs: 15 * 60,
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Colour scheme of the browser UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

/// Persisted UI preferences (process-wide, injected through `AppState`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiPreferences {
    pub theme: Theme,
    /// Last opened view: `labeling`, `history`, `profile` or `admin`
    pub active_tab: String,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            active_tab: "labeling".to_string(),
        }
    }
}

/// Full contents of `olab.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// The user with this e-mail gets the admin views
    pub admin_email: String,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub ui: UiPreferences,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            admin_email: "admin@local.auth".to_string(),
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            session: SessionConfig::default(),
            ui: UiPreferences::default(),
        }
    }
}

impl TomlConfig {
    /// Parse a config file, failing on I/O or syntax errors
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file; a missing or invalid file yields defaults
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to load {}: {} (using defaults)", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the configuration back (used when UI preferences change)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.batch_size == 0 {
            return Err(Error::Config("session.batch_size must be at least 1".to_string()));
        }
        if let BackendConfig::Hosted { url, .. } = &self.backend {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!("backend.url is not an http(s) URL: {}", url)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.session.batch_size, 10);
        assert_eq!(config.session.inactivity_timeout(), Duration::from_secs(900));
        assert_eq!(config.backend, BackendConfig::Local);
        assert_eq!(config.ui.theme, Theme::Dark);
        assert_eq!(config.admin_email, "admin@local.auth");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            admin_email = "boss@example.org"

            [session]
            batch_size = 25

            [backend]
            kind = "hosted"
            url = "https://project.example.co"
            api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.batch_size, 25);
        assert_eq!(config.session.request_timeout_secs, 30);
        assert_eq!(config.server.port, 5780);
        assert_eq!(
            config.backend,
            BackendConfig::Hosted {
                url: "https://project.example.co".to_string(),
                api_key: "secret".to_string(),
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = TomlConfig::default();
        config.session.batch_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_theme_toggle() {
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
    }
}
