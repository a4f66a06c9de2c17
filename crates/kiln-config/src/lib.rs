//! `kiln.toml` loading.
//!
//! The file is looked up in the working directory and its ancestors unless a
//! path is given. Command-line overrides arrive as [`CliSettings`].
//!
//! `runtime.url` and `credentials.path` may reference environment variables as
//! `${VAR}` (required) or `${VAR:-default}`.

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line overrides. `None` keeps the value from the file.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the runtime build directory.
    pub runtime_dir: Option<PathBuf>,
    /// Override the runtime base URL.
    pub runtime_url: Option<String>,
    /// Override the debounce delay in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Override the credential file location.
    pub credentials_path: Option<PathBuf>,
}

/// File name looked up during discovery.
const CONFIG_FILENAME: &str = "kiln.toml";

/// Credential file used when none is configured.
const DEFAULT_CREDENTIALS_PATH: &str = "${HOME:-.}/.config/kiln/credentials.json";

/// Loaded `kiln.toml`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runtime build source (paths are relative strings from TOML).
    runtime: RuntimeConfigRaw,
    /// Sync engine configuration.
    pub sync: SyncConfig,
    /// Credential file configuration.
    credentials: CredentialsConfigRaw,

    /// Resolved runtime source (set after loading).
    #[serde(skip)]
    pub runtime_resolved: RuntimeSourceConfig,
    /// Resolved credential file path (set after loading).
    #[serde(skip)]
    pub credentials_path: PathBuf,
    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw runtime configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RuntimeConfigRaw {
    dir: Option<String>,
    url: Option<String>,
}

/// Where the runtime build (template, manifest, assets) is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeSourceConfig {
    /// Local build output directory.
    Dir(PathBuf),
    /// HTTP base URL serving the build output.
    Url(String),
}

impl Default for RuntimeSourceConfig {
    fn default() -> Self {
        Self::Dir(PathBuf::from("dist"))
    }
}

/// Sync engine configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a write runs, in milliseconds.
    pub debounce_ms: u64,
    /// Directory names never pruned from local scopes.
    pub prune_exclude: Vec<String>,
    /// Files probed during build asset reconciliation.
    pub probe_files: Vec<String>,
}

impl SyncConfig {
    /// Debounce delay as a duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            prune_exclude: vec!["node_modules".to_owned(), ".git".to_owned()],
            probe_files: vec!["robots.txt".to_owned(), "fonts.json".to_owned()],
        }
    }
}

/// Raw credential configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CredentialsConfigRaw {
    path: Option<String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`runtime.url`").
        field: String,
        /// Error message (e.g., "${`RUNTIME_URL`} not set").
        message: String,
    },
}

/// Reject URLs that are not http(s).
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load `config_path`, or the discovered `kiln.toml`, or defaults.
    ///
    /// `cli_settings` win over file values and are validated again.
    ///
    /// # Errors
    ///
    /// Fails when an explicit `config_path` is missing, the file does not parse
    /// or a value is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(dir) = &settings.runtime_dir {
            self.runtime_resolved = RuntimeSourceConfig::Dir(dir.clone());
        }
        if let Some(url) = &settings.runtime_url {
            self.runtime_resolved = RuntimeSourceConfig::Url(url.clone());
        }
        if let Some(debounce_ms) = settings.debounce_ms {
            self.sync.debounce_ms = debounce_ms;
        }
        if let Some(path) = &settings.credentials_path {
            self.credentials_path.clone_from(path);
        }
    }

    /// Nearest `kiln.toml` walking up from the working directory.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Defaults with the runtime directory under `base`.
    fn default_with_base(base: &Path) -> Self {
        Self {
            runtime: RuntimeConfigRaw::default(),
            sync: SyncConfig::default(),
            credentials: CredentialsConfigRaw::default(),
            runtime_resolved: RuntimeSourceConfig::Dir(base.join("dist")),
            credentials_path: default_credentials_path(base),
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Paths may come from variables, so expand first.
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "sync.debounce_ms must be greater than 0".to_owned(),
            ));
        }
        if let RuntimeSourceConfig::Url(url) = &self.runtime_resolved {
            require_http_url(url, "runtime.url")?;
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref url) = self.runtime.url {
            self.runtime.url = Some(expand::expand_env(url, "runtime.url")?);
        }
        if let Some(ref path) = self.credentials.path {
            self.credentials.path = Some(expand::expand_env(path, "credentials.path")?);
        }
        Ok(())
    }

    /// Anchor relative paths at `config_dir`. A `[runtime]` section may name a
    /// directory or a URL, not both.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        self.runtime_resolved = match (&self.runtime.dir, &self.runtime.url) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Validation(
                    "[runtime] accepts either dir or url, not both".to_owned(),
                ));
            }
            (Some(dir), None) => RuntimeSourceConfig::Dir(config_dir.join(dir)),
            (None, Some(url)) => RuntimeSourceConfig::Url(url.trim_end_matches('/').to_owned()),
            (None, None) => RuntimeSourceConfig::Dir(config_dir.join("dist")),
        };

        self.credentials_path = match &self.credentials.path {
            Some(path) => config_dir.join(path),
            None => default_credentials_path(config_dir),
        };

        Ok(())
    }
}

/// Default credential file, falling back to `base` when `HOME` is unset.
fn default_credentials_path(base: &Path) -> PathBuf {
    match expand::expand_env(DEFAULT_CREDENTIALS_PATH, "credentials.path") {
        Ok(path) if !path.starts_with('.') => PathBuf::from(path),
        _ => base.join(".kiln").join("credentials.json"),
    }
}
