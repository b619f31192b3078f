//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML configuration files (`anvil.toml`, `config.toml`)
//! - `yaml-config`: enables YAML configuration files (`anvil.yaml`, `anvil.yml`, etc.)
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic defaults passed to [`ConfigLoader::merge`]
//! 3. Main config file (`anvil.toml`)
//! 4. Profile-specific config file (`anvil.{profile}.toml`)
//! 5. Environment variables (`ANVIL_*`)
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `ANVIL_` prefix with `__` as separator:
//!
//! - `ANVIL_BOT__INVOKER=?` → `bot.invoker = "?"`
//! - `ANVIL_INTERACTION__EDIT_INTERVAL_MS=500` → `interaction.edit_interval_ms = 500`
//! - `ANVIL_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//!
//! # Example
//!
//! ```rust,ignore
//! use anvil_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./config/anvil.toml")
//!     .load()?;
//! ```

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::AnvilConfig;
use super::validation::validate_config;

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `ANVIL_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("ANVIL_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/anvil` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("anvil")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: AnvilConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads the configuration without validating it.
    pub fn load(self) -> ConfigResult<AnvilConfig> {
        let profile = self.profile.clone();
        let config: AnvilConfig = self.build_figment()?.extract()?;

        debug!(
            profile = %profile,
            invoker = %config.bot.invoker,
            logging_level = %config.logging.level,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Loads and validates the configuration.
    pub fn load_validated(self) -> ConfigResult<AnvilConfig> {
        let config = self.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AnvilConfig::default()))
            .merge(std::mem::take(&mut self.figment));

        match &self.config_file {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => {
                let extension = path.extension().and_then(OsStr::to_str).unwrap_or_default();
                let format = FileFormat::from_extension(extension).ok_or_else(|| {
                    ConfigError::UnsupportedFormat {
                        extension: extension.to_string(),
                    }
                })?;
                info!(path = %path.display(), "Loading configuration file");
                figment = format.merge(figment, path);
            }
            None => {
                let files = self.discovered_files();
                if files.is_empty() {
                    warn!(profile = %self.profile, "No configuration file found, using defaults");
                }
                for (format, path) in files {
                    info!(path = %path.display(), "Loading configuration file");
                    figment = format.merge(figment, &path);
                }
            }
        }

        if self.load_env {
            trace!("Loading environment variables with ANVIL_ prefix");
            figment = figment.merge(Env::prefixed("ANVIL_").split("__"));
        }
        Ok(figment)
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("anvil")))
            .collect()
    }

    /// For each enabled format, the first base file found in the search
    /// paths followed by its profile overlay, skipping whichever is missing.
    fn discovered_files(&self) -> Vec<(FileFormat, PathBuf)> {
        let search_paths = self.resolve_search_paths();
        let mut files = Vec::new();
        for format in FileFormat::enabled() {
            let layers = search_paths
                .iter()
                .flat_map(|dir| format.base_names().iter().map(move |name| (dir, *name)))
                .find_map(|(dir, name)| {
                    let layers: Vec<PathBuf> = [dir.join(name), dir.join(overlay_name(name, &self.profile))]
                        .into_iter()
                        .filter(|path| path.exists())
                        .collect();
                    (!layers.is_empty()).then_some(layers)
                });
            files.extend(layers.into_iter().flatten().map(|path| (format, path)));
        }
        debug!(files = files.len(), "Discovered configuration files");
        files
    }
}

/// `anvil.toml` becomes `anvil.production.toml`.
fn overlay_name(base: &str, profile: &Profile) -> String {
    match base.rsplit_once('.') {
        Some((stem, extension)) => format!("{stem}.{profile}.{extension}"),
        None => format!("{base}.{profile}"),
    }
}

/// A configuration file format enabled at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    fn enabled() -> Vec<Self> {
        #[allow(unused_mut)]
        let mut formats = Vec::new();
        #[cfg(feature = "toml-config")]
        formats.push(Self::Toml);
        #[cfg(feature = "yaml-config")]
        formats.push(Self::Yaml);
        formats
    }

    fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            #[cfg(feature = "toml-config")]
            "toml" => Some(Self::Toml),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// File names searched for, most preferred first.
    fn base_names(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["anvil.toml", "config.toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["anvil.yaml", "anvil.yml", "config.yaml", "config.yml"],
        }
    }

    fn merge(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(Yaml::file(path)),
        }
    }
}

/// Loads and validates configuration from the default locations.
pub fn load_config() -> ConfigResult<AnvilConfig> {
    ConfigLoader::new().load_validated()
}

/// Loads and validates configuration from `path`, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<AnvilConfig> {
    ConfigLoader::new().file(path).load_validated()
}

// =============================================================================
// Tests
// =============================================================================
