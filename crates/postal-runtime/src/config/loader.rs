//! Layered configuration loading.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides ([`ConfigLoader::merge`])
//! 3. `postal.toml` / `postal.yaml`, from an explicit file or the first search
//!    directory that has one
//! 4. `postal.{profile}.toml` / `postal.{profile}.yaml` next to it
//! 5. `POSTAL_*` environment variables
//!
//! TOML needs the `toml-config` feature (default), YAML needs `yaml-config`.
//!
//! # Environment variables
//!
//! Nested keys are separated by `__`:
//!
//! - `POSTAL_LOGGING__LEVEL=debug` sets `logging.level`
//! - `POSTAL_DEFAULT_BUS=events` sets `default_bus`
//! - `POSTAL_BUSES__EVENTS__PANEL=false` sets `buses.events.panel`
//!
//! Bus names containing `.` cannot be addressed this way.
//!
//! ```rust,ignore
//! use postal_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./config/postal.toml")
//!     .load_validated()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::PostalConfig;
use super::validation::validate_config;

const FILE_STEM: &str = "postal";
const ENV_PREFIX: &str = "POSTAL_";

// =============================================================================
// Profile
// =============================================================================

/// Selects the `postal.{profile}.*` overlay file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile(String);

impl Profile {
    /// Environment variable read by [`Profile::from_env`].
    pub const ENV_VAR: &'static str = "POSTAL_PROFILE";

    /// Normalizes `name`; `dev` and `prod` expand to their long forms.
    pub fn new(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "dev" => Self::development(),
            "prod" => Self::production(),
            _ => Self(name),
        }
    }

    pub fn development() -> Self {
        Self("development".to_string())
    }

    pub fn production() -> Self {
        Self("production".to_string())
    }

    /// `POSTAL_PROFILE`, or development when unset.
    pub fn from_env() -> Self {
        std::env::var(Self::ENV_VAR)
            .map(|name| Self::new(&name))
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::development()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// File formats
// =============================================================================

/// Configuration file formats enabled by cargo features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    const ENABLED: &'static [FileFormat] = &[
        #[cfg(feature = "toml-config")]
        FileFormat::Toml,
        #[cfg(feature = "yaml-config")]
        FileFormat::Yaml,
    ];

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        Self::ENABLED
            .iter()
            .copied()
            .find(|format| format.extensions().contains(&ext))
            .ok_or_else(|| ConfigError::UnsupportedFormat(ext.to_string()))
    }

    fn merge(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(figment::providers::Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(figment::providers::Yaml::file(path)),
        }
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Builds a [`PostalConfig`] from defaults, files and the environment.
#[derive(Debug)]
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    file: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Profile from `POSTAL_PROFILE`, `POSTAL_*` environment overrides, and
    /// the current and user configuration directories as search directories
    /// unless others are added.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            file: None,
            search_dirs: Vec::new(),
            env_prefix: Some(ENV_PREFIX.to_string()),
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::new(profile.as_ref());
        self
    }

    /// Loads this file instead of searching. It must exist.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds a directory to search for `postal.*` files, in order.
    pub fn search_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.search_dirs.push(dir.as_ref().to_path_buf());
        self
    }

    pub fn search_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_dir(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/postal`.
    pub fn search_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_dir(dir.join(FILE_STEM)),
            None => self,
        }
    }

    /// Reads overrides from variables starting with `prefix` instead of `POSTAL_`.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Ignores environment variables.
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Layers `config` over the defaults, below any file.
    pub fn merge(mut self, config: PostalConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads the configuration without validating it.
    pub fn load(self) -> ConfigResult<PostalConfig> {
        let profile = self.profile.clone();
        let config: PostalConfig = self.figment()?.extract()?;

        debug!(
            profile = %profile,
            level = %config.logging.level,
            buses = config.buses.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads the configuration and runs [`validate_config`] on it.
    pub fn load_validated(self) -> ConfigResult<PostalConfig> {
        let config = self.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn figment(self) -> ConfigResult<Figment> {
        let files = match &self.file {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => vec![(FileFormat::from_path(path)?, path.clone())],
            None => {
                let found = self.discover();
                if found.is_empty() {
                    warn!("No configuration file found, using defaults");
                }
                found
            }
        };

        let mut figment =
            Figment::from(Serialized::defaults(PostalConfig::default())).merge(self.overrides);

        for (format, path) in files {
            info!(path = %path.display(), "Loading configuration file");
            figment = format.merge(figment, &path);

            let overlay = profile_path(&path, &self.profile);
            if overlay.exists() {
                debug!(
                    path = %overlay.display(),
                    profile = %self.profile,
                    "Loading profile overlay"
                );
                figment = format.merge(figment, &overlay);
            }
        }

        if let Some(prefix) = &self.env_prefix {
            trace!(prefix = %prefix, "Loading environment overrides");
            figment = figment.merge(Env::prefixed(prefix).split("__"));
        }
        Ok(figment)
    }

    /// For each enabled format, the base file in the first directory that has one.
    fn discover(&self) -> Vec<(FileFormat, PathBuf)> {
        let dirs = if self.search_dirs.is_empty() {
            default_search_dirs()
        } else {
            self.search_dirs.clone()
        };

        FileFormat::ENABLED
            .iter()
            .filter_map(|&format| {
                dirs.iter()
                    .flat_map(|dir| {
                        format
                            .extensions()
                            .iter()
                            .map(move |ext| dir.join(format!("{FILE_STEM}.{ext}")))
                    })
                    .find(|path| path.exists())
                    .map(|path| (format, path))
            })
            .collect()
    }
}

fn default_search_dirs() -> Vec<PathBuf> {
    std::env::current_dir()
        .ok()
        .into_iter()
        .chain(dirs::config_dir().map(|dir| dir.join(FILE_STEM)))
        .collect()
}

/// `dir/postal.toml` becomes `dir/postal.{profile}.toml`.
fn profile_path(base: &Path, profile: &Profile) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(FILE_STEM);
    let ext = base.extension().and_then(|e| e.to_str()).unwrap_or_default();
    base.with_file_name(format!("{stem}.{profile}.{ext}"))
}

/// Loads configuration from the default locations and validates it.
pub fn load_config() -> ConfigResult<PostalConfig> {
    ConfigLoader::new().load_validated()
}

/// Loads `path` plus environment overrides and validates the result.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<PostalConfig> {
    ConfigLoader::new().file(path).load_validated()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::schema::LogLevel;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("postal-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = scratch_dir("defaults");
        let config = ConfigLoader::new()
            .search_dir(&dir)
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config, PostalConfig::default());
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::new("prod"), Profile::production());
        assert_eq!(Profile::new(" Development "), Profile::development());
        assert_eq!(Profile::new("Staging").name(), "staging");
    }

    #[test]
    fn test_profile_path() {
        let path = profile_path(Path::new("/etc/postal/postal.toml"), &Profile::new("staging"));
        assert_eq!(path, Path::new("/etc/postal/postal.staging.toml"));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new()
            .file("/definitely/not/here/postal.toml")
            .without_env()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = scratch_dir("ini");
        let path = dir.join("postal.ini");
        fs::write(&path, "level=debug").unwrap();

        let err = ConfigLoader::new().file(&path).without_env().load().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ref ext) if ext == "ini"));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_toml_file() {
        let dir = scratch_dir("toml");
        let path = dir.join("postal.toml");
        fs::write(
            &path,
            r#"
default_bus = "command.bus"

[logging]
level = "debug"

[buses."command.bus"]
single_handler_per_message = true
middleware = ["audit", "dedup"]

[buses."event.bus"]
allow_no_handlers = true
panel = false
"#,
        )
        .unwrap();

        let config = ConfigLoader::new().file(&path).without_env().load().unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.default_bus.as_deref(), Some("command.bus"));

        let command = &config.buses["command.bus"];
        assert!(command.single_handler_per_message);
        assert!(command.panel);
        assert_eq!(command.middleware, ["audit", "dedup"]);

        let event = &config.buses["event.bus"];
        assert!(event.allow_no_handlers);
        assert!(!event.panel);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_overlay_wins_over_base_file() {
        let dir = scratch_dir("profile");
        fs::write(
            dir.join("postal.toml"),
            "[logging]\nlevel = \"warn\"\nthread_ids = true\n",
        )
        .unwrap();
        fs::write(
            dir.join("postal.staging.toml"),
            "[logging]\nlevel = \"debug\"\n\n[buses.events]\nallow_no_handlers = true\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .profile("staging")
            .search_dir(&dir)
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.thread_ids);
        assert!(config.buses["events"].allow_no_handlers);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_invalid_level_fails_to_parse() {
        let dir = scratch_dir("bad-level");
        let path = dir.join("postal.toml");
        fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();

        let err = ConfigLoader::new().file(&path).without_env().load().unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_merge_sits_below_environment() {
        let mut overrides = PostalConfig::default();
        overrides.logging.level = LogLevel::Error;
        overrides.default_bus = Some("events".into());

        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("POSTAL_MERGE_TEST_LOGGING__LEVEL", "warn") };
        let config = ConfigLoader::new()
            .search_dir(scratch_dir("merge"))
            .env_prefix("POSTAL_MERGE_TEST_")
            .merge(overrides)
            .load();
        unsafe { std::env::remove_var("POSTAL_MERGE_TEST_LOGGING__LEVEL") };

        let config = config.unwrap();
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.default_bus.as_deref(), Some("events"));
    }

    #[test]
    fn test_env_overrides() {
        let dir = scratch_dir("env");
        // SAFETY: the variable names are unique to this test.
        unsafe {
            std::env::set_var("POSTAL_LOADER_TEST_LOGGING__LEVEL", "trace");
            std::env::set_var("POSTAL_LOADER_TEST_BUSES__EVENTS__PANEL", "false");
        }

        let config = ConfigLoader::new()
            .search_dir(&dir)
            .env_prefix("POSTAL_LOADER_TEST_")
            .load();

        unsafe {
            std::env::remove_var("POSTAL_LOADER_TEST_LOGGING__LEVEL");
            std::env::remove_var("POSTAL_LOADER_TEST_BUSES__EVENTS__PANEL");
        }

        let config = config.unwrap();
        assert_eq!(config.logging.level, LogLevel::Trace);
        assert!(!config.buses["events"].panel);
    }
}
