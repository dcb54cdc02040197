//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML files (`molar.toml`, `config.toml`)
//! - `yaml-config`: enables YAML files (`molar.yaml`, `molar.yml`, `config.yaml`, `config.yml`)
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific config file (`molar.{profile}.toml`)
//! 3. Main config file (`molar.toml`)
//! 4. Legacy deployment variables (`FASTAPI_URL`, `PORT`)
//! 5. Environment variables (`MOLAR_*`)
//! 6. Programmatic overrides
//!
//! # Environment Variable Mapping
//!
//! - `MOLAR_SERVER__PORT=3002` → `server.port = 3002`
//! - `MOLAR_SESSION__DIR=/var/lib/molar` → `session.dir = "/var/lib/molar"`
//! - `MOLAR_GATEWAY__ACCESS_TOKEN=xxx` → `gateway.access_token = "xxx"`
//! - `FASTAPI_URL=http://backend:8001` → `backend.base_url`
//! - `PORT=3001` → `server.port`
//!
//! # Example
//!
//! ```rust,ignore
//! use molar_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("/etc/molar/molar.toml")
//!     .load()?;
//! ```

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
use super::schema::MolarConfig;
use super::validation::validate_config;

/// Environment variable selecting the profile.
pub const PROFILE_ENV: &str = "MOLAR_PROFILE";

/// Variables the original deployment was configured with, and where they land.
const LEGACY_ENV: &[(&str, &str)] = &[("FASTAPI_URL", "backend.base_url"), ("PORT", "server.port")];

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

    /// Parses a profile name, accepting the usual abbreviations.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `MOLAR_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Layered configuration loader.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
    validate: bool,
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
            validate: true,
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

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Ignores both `MOLAR_*` and the legacy variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Skips [`validate_config`] after extraction.
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Merges overrides on top of every other source.
    pub fn merge(mut self, config: MolarConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<MolarConfig> {
        let profile = self.profile.clone();
        let validate = self.validate;
        let figment = self.build_figment()?;

        let config: MolarConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;

        if validate {
            validate_config(&config)?;
        }

        debug!(
            profile = %profile,
            port = config.server.port,
            backend = %config.backend.base_url,
            gateway = %config.gateway.url,
            logging_level = %config.logging.level,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(MolarConfig::default()));

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            for &(var, key) in LEGACY_ENV {
                trace!(var, key, "Mapping legacy environment variable");
                figment = figment.merge(Env::raw().only(&[var]).map(move |_| key.into()));
            }

            trace!("Loading environment variables with MOLAR_ prefix");
            figment = figment.merge(
                Env::prefixed("MOLAR_")
                    .ignore(&["PROFILE"])
                    .map(|key| key.as_str().replace("__", ".").into()),
            );
        }

        let overrides = std::mem::take(&mut self.figment);
        Ok(figment.merge(overrides))
    }

    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("molar"));
        }
        paths
    }

    /// Searches `search_paths × base_names`, profile variant first.
    ///
    /// Stops at the first base file found.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    figment = merge_fn(figment, &base_path);
                    return (figment, true);
                }
            }
        }
        (figment, false)
    }

    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        #[allow(unused_mut)]
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["molar.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["molar.yaml", "molar.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<MolarConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from a specific file plus environment overrides.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<MolarConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_dir_loader(dir: &tempfile::TempDir) -> ConfigLoader {
        ConfigLoader::new().search_path(dir.path()).without_env()
    }

    #[test]
    fn test_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = empty_dir_loader(&dir).load().unwrap();

        assert_eq!(config, MolarConfig::default());
        assert_eq!(config.logging.level.as_str(), "info");
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = ConfigLoader::new()
            .without_env()
            .file("/nonexistent/molar.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("DEV"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_is_overridden_by_main_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("molar.production.toml"),
            "[server]\nport = 4000\n[session]\nqr_ttl_secs = 90\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("molar.toml"), "[server]\nport = 4100\n").unwrap();

        let config = empty_dir_loader(&dir).profile("production").load().unwrap();

        assert_eq!(config.server.port, 4100);
        assert_eq!(config.session.qr_ttl_secs, 90);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("molar.toml"), "[session]\nqr_ttl_secs = 5\n").unwrap();

        assert!(empty_dir_loader(&dir).load().is_err());
        assert!(
            empty_dir_loader(&dir)
                .without_validation()
                .load()
                .is_ok()
        );
    }

    #[test]
    fn test_programmatic_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut overrides = MolarConfig::default();
        overrides.dispatch.bulk_interval_ms = 500;

        let config = empty_dir_loader(&dir).merge(overrides).load().unwrap();
        assert_eq!(config.dispatch.bulk_interval_ms, 500);
    }

    #[test]
    fn test_legacy_env_variables() {
        let dir = tempfile::tempdir().unwrap();
        // SAFETY: the only test in this crate reading these variables
        unsafe {
            std::env::set_var("FASTAPI_URL", "http://classifier:9000");
        }
        let config = ConfigLoader::new().search_path(dir.path()).load();
        unsafe {
            std::env::remove_var("FASTAPI_URL");
        }

        assert_eq!(config.unwrap().backend.base_url, "http://classifier:9000");
    }
}
