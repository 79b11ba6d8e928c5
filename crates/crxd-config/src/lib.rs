//! Configuration management for crxd.
//!
//! Parses `crxd.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `extension.name`
//! - `build.command`
//! - `build.scripts_command`

mod expand;

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override channel host.
    pub host: Option<String>,
    /// Override preferred channel port.
    pub port: Option<u16>,
    /// Override extension name.
    pub name: Option<String>,
    /// Override build output directory.
    pub dist_dir: Option<PathBuf>,
    /// Override debounce window.
    pub debounce_ms: Option<u64>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "crxd.toml";

/// Source extensions watched when `watch.include` is not set.
const DEFAULT_WATCH_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "vue", "css", "scss", "html", "json", "png", "jpg", "jpeg", "gif",
    "svg",
];

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Notification channel configuration.
    pub server: ServerConfig,
    /// Extension configuration (paths are relative strings from TOML).
    extension: ExtensionConfigRaw,
    /// Bundler and rebuild configuration.
    pub build: BuildConfig,
    /// Change watcher configuration.
    pub watch: WatchConfig,
    /// Client listener configuration.
    pub client: ClientConfig,

    /// Resolved extension configuration (set after loading).
    #[serde(skip)]
    pub extension_resolved: ExtensionConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Notification channel configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Preferred port. The next free port upward is used if it is taken.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8787,
        }
    }
}

/// Raw extension configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ExtensionConfigRaw {
    name: Option<String>,
    dist_dir: Option<String>,
    constants_file: Option<String>,
}

/// Resolved extension configuration with absolute paths.
#[derive(Debug, Default)]
pub struct ExtensionConfig {
    /// Stable extension identifier, used in the upgrade path.
    pub name: String,
    /// Project root (directory holding `crxd.toml`).
    pub project_dir: PathBuf,
    /// Build output directory holding `manifest.json`.
    pub dist_dir: PathBuf,
    /// Generated constants module read by the bridge sources.
    pub constants_file: PathBuf,
}

impl ExtensionConfig {
    /// Built manifest path.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dist_dir.join("manifest.json")
    }
}

/// Bundler and rebuild configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Long-running bundler watch command. Empty disables it.
    pub command: Vec<String>,
    /// Stdout substring that marks a finished build.
    pub ready_marker: Option<String>,
    /// Fixed wait for the initial build when no marker is configured.
    pub settle_ms: u64,
    /// Command that compiles the bridge scripts. When unset, crxd emits them itself.
    pub scripts_command: Option<Vec<String>>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: ["npx", "vite", "build", "--watch"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            ready_marker: None,
            settle_ms: 10_000,
            scripts_command: None,
        }
    }
}

/// Change watcher configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Glob patterns (relative to the project root) that trigger a rebuild.
    pub include: Option<Vec<String>>,
    /// Extra glob patterns to ignore, on top of the built-in excludes.
    pub exclude: Vec<String>,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            include: None,
            exclude: Vec::new(),
            debounce_ms: 1000,
        }
    }
}

impl WatchConfig {
    /// Include patterns, falling back to every source type under `src/`.
    #[must_use]
    pub fn include_patterns(&self) -> Vec<String> {
        self.include.clone().unwrap_or_else(|| {
            DEFAULT_WATCH_EXTENSIONS
                .iter()
                .map(|ext| format!("src/**/*.{ext}"))
                .collect()
        })
    }
}

/// Client listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Liveness ping cadence in milliseconds.
    pub ping_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 5000,
        }
    }
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
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message from the expander.
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `crxd.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the final configuration is invalid.
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

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(name) = &settings.name {
            self.extension_resolved.name.clone_from(name);
        }
        if let Some(dist_dir) = &settings.dist_dir {
            self.extension_resolved.dist_dir.clone_from(dist_dir);
        }
        if let Some(debounce_ms) = settings.debounce_ms {
            self.watch.debounce_ms = debounce_ms;
        }
    }

    /// Search for config file in current directory and parents.
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

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        let mut config = Self {
            server: ServerConfig::default(),
            extension: ExtensionConfigRaw::default(),
            build: BuildConfig::default(),
            watch: WatchConfig::default(),
            client: ClientConfig::default(),
            extension_resolved: ExtensionConfig::default(),
            config_path: None,
        };
        config.resolve_paths(base);
        config
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        require_non_empty(&self.extension_resolved.name, "extension.name")?;

        if self
            .build
            .scripts_command
            .as_ref()
            .is_some_and(Vec::is_empty)
        {
            return Err(ConfigError::Validation(
                "build.scripts_command cannot be empty".to_owned(),
            ));
        }

        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be greater than 0".to_owned(),
            ));
        }
        if self.client.ping_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "client.ping_interval_ms must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref name) = self.extension.name {
            self.extension.name = Some(expand::expand_env(name, "extension.name")?);
        }

        expand::expand_env_all(&mut self.build.command, "build.command")?;
        if let Some(ref mut scripts) = self.build.scripts_command {
            expand::expand_env_all(scripts, "build.scripts_command")?;
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.extension_resolved = ExtensionConfig {
            name: self
                .extension
                .name
                .clone()
                .unwrap_or_else(|| crxd_protocol::DEFAULT_EXTENSION_NAME.to_owned()),
            project_dir: config_dir.to_path_buf(),
            dist_dir: resolve(self.extension.dist_dir.as_deref(), "dist"),
            constants_file: resolve(
                self.extension.constants_file.as_deref(),
                "src/dev/constants.ts",
            ),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.extension_resolved.name, "web-update-alerts");
        assert_eq!(config.extension_resolved.dist_dir, PathBuf::from("/test/dist"));
        assert_eq!(
            config.extension_resolved.manifest_path(),
            PathBuf::from("/test/dist/manifest.json")
        );
        assert_eq!(
            config.extension_resolved.constants_file,
            PathBuf::from("/test/src/dev/constants.ts")
        );
        assert_eq!(config.watch.debounce_ms, 1000);
        assert_eq!(config.client.ping_interval_ms, 5000);
        assert_eq!(config.build.settle_ms, 10_000);
        assert_eq!(config.build.command, vec!["npx", "vite", "build", "--watch"]);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8787);
        assert!(config.build.scripts_command.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 9000

[extension]
name = "my-extension"
dist_dir = "build"

[build]
command = ["pnpm", "vite", "build", "--watch"]
ready_marker = "built in"
scripts_command = ["node", "scripts/build-dev-scripts.js"]

[watch]
include = ["src/**/*.ts"]
exclude = ["**/*.snap"]
debounce_ms = 250

[client]
ping_interval_ms = 2000
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.extension_resolved.name, "my-extension");
        assert_eq!(
            config.extension_resolved.dist_dir,
            PathBuf::from("/project/build")
        );
        assert_eq!(config.build.ready_marker.as_deref(), Some("built in"));
        assert_eq!(
            config.build.scripts_command,
            Some(vec![
                "node".to_owned(),
                "scripts/build-dev-scripts.js".to_owned()
            ])
        );
        assert_eq!(config.watch.include_patterns(), vec!["src/**/*.ts"]);
        assert_eq!(config.watch.exclude, vec!["**/*.snap"]);
        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.client.ping_interval_ms, 2000);
    }

    #[test]
    fn test_default_include_patterns() {
        let patterns = WatchConfig::default().include_patterns();
        assert!(patterns.contains(&"src/**/*.ts".to_owned()));
        assert!(patterns.contains(&"src/**/*.vue".to_owned()));
        assert!(patterns.contains(&"src/**/*.svg".to_owned()));
        assert_eq!(patterns.len(), DEFAULT_WATCH_EXTENSIONS.len());
    }

    #[test]
    fn test_apply_cli_settings_port() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            port: Some(9000),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1"); // Unchanged
    }

    #[test]
    fn test_apply_cli_settings_multiple() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            host: Some("0.0.0.0".to_owned()),
            name: Some("other".to_owned()),
            dist_dir: Some(PathBuf::from("/elsewhere")),
            debounce_ms: Some(50),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.extension_resolved.name, "other");
        assert_eq!(config.extension_resolved.dist_dir, PathBuf::from("/elsewhere"));
        assert_eq!(config.watch.debounce_ms, 50);
        assert_eq!(config.server.port, 8787);
    }

    #[test]
    fn test_load_from_file_resolves_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[extension]\ndist_dir = \"out\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.extension_resolved.dist_dir, dir.path().join("out"));
        assert_eq!(config.extension_resolved.project_dir, dir.path());
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/crxd.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_invalid_cli_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "").unwrap();

        let overrides = CliSettings {
            debounce_ms: Some(0),
            ..Default::default()
        };
        let err = Config::load(Some(&path), Some(&overrides)).unwrap_err();
        assert!(err.to_string().contains("debounce_ms"));
    }

    #[test]
    fn test_expand_env_vars_build_command() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("CRXD_TEST_PM", "pnpm");
        }

        let toml = r#"
[build]
command = ["${CRXD_TEST_PM}", "vite", "build", "--watch"]
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();

        assert_eq!(config.build.command[0], "pnpm");

        unsafe {
            std::env::remove_var("CRXD_TEST_PM");
        }
    }

    #[test]
    fn test_expand_env_vars_missing_required_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("CRXD_MISSING_HOST_TEST");
        }

        let toml = r#"
[server]
host = "${CRXD_MISSING_HOST_TEST}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        let err = config.expand_env_vars().unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("server.host"));
    }

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_validation_error(config: &Config, expected_substrings: &[&str]) {
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected_substrings {
            assert!(msg.contains(s), "Expected error to contain '{s}', got: {msg}");
        }
    }

    #[test]
    fn test_validate_default_config_passes() {
        let config = Config::default_with_base(Path::new("/test"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_server_port_zero() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.port = 0;
        assert_validation_error(&config, &["server.port"]);
    }

    #[test]
    fn test_validate_empty_extension_name() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.extension_resolved.name = String::new();
        assert_validation_error(&config, &["extension.name", "empty"]);
    }

    #[test]
    fn test_validate_empty_scripts_command() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.build.scripts_command = Some(Vec::new());
        assert_validation_error(&config, &["build.scripts_command"]);
    }

    #[test]
    fn test_validate_zero_ping_interval() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.client.ping_interval_ms = 0;
        assert_validation_error(&config, &["ping_interval_ms"]);
    }
}
