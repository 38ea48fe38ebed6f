//! Configuration loader using figment.
//!
//! # Configuration priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific config file (`trellis.{profile}.toml`)
//! 3. Main config file (`trellis.toml` / `config.toml`)
//! 4. Environment variables (`TRELLIS_*`)
//! 5. Programmatic overrides
//!
//! # Environment variable mapping
//!
//! Environment variables use the `TRELLIS_` prefix with `__` as the
//! nesting separator:
//!
//! - `TRELLIS_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `TRELLIS_ROUTER__SIMILARITY=0.7` → `router.similarity = 0.7`

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use tracing::{debug, info, trace, warn};

use super::schema::TrellisConfig;
use crate::error::{ConfigError, ConfigResult};

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Creates a profile from `TRELLIS_PROFILE` or defaults to Development.
    pub fn from_env() -> Self {
        std::env::var("TRELLIS_PROFILE")
            .map(|p| Self::from_name(&p))
            .unwrap_or_default()
    }

    fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<TrellisConfig> {
    ConfigLoader::new().with_current_dir().load()
}

/// Loads configuration from a specific file, plus environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<TrellisConfig> {
    ConfigLoader::new().file(path).load()
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::from_name(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: TrellisConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<TrellisConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: TrellisConfig = figment
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            "configuration loaded"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(TrellisConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = &self.config_file {
            if path.exists() {
                info!(path = %path.display(), "loading configuration file");
                figment = figment.merge(Toml::file(path));
            } else {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("loading environment variables with TRELLIS_ prefix");
            figment = figment.merge(
                Env::prefixed("TRELLIS_")
                    .split("__")
                    .map(|key| key.as_str().replace("__", ".").into()),
            );
        }

        Ok(figment)
    }

    /// Searches the configured paths, a profile-specific file first and
    /// then the base file; the first base file found ends the search.
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        for search_path in &self.search_paths {
            for base_name in ["trellis.toml", "config.toml"] {
                let stem = base_name.trim_end_matches(".toml");
                let profile_name = format!("{}.{}.toml", stem, self.profile.as_str());
                let profile_path = search_path.join(&profile_name);
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "loading profile-specific config");
                    figment = figment.merge(Toml::file(&profile_path));
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "loading configuration file");
                    return figment.merge(Toml::file(&base_path));
                }
            }
        }
        warn!("no configuration file found, using defaults");
        figment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_sources() {
        let config = ConfigLoader::new().without_env().load().unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.router.prefixes.is_empty());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = ConfigLoader::new()
            .without_env()
            .merge(
                Figment::from(Toml::string(
                    r#"
                    [logging]
                    level = "debug"

                    [router]
                    prefixes = ["!"]
                    similarity = 0.7
                    "#,
                ))
                .extract()
                .unwrap(),
            )
            .load()
            .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.router.prefixes, ["!"]);
        assert_eq!(config.router.similarity, 0.7);
        // Untouched settings keep their defaults.
        assert_eq!(config.router.accept_word, "yes");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConfigLoader::new()
            .without_env()
            .file("/nonexistent/trellis.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
