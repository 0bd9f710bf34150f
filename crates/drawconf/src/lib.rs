//! Configuration loading for the drawbridge gateway.
//!
//! Every value here is fixed for the life of the process: paths, listener
//! address, TLS material, telemetry endpoints, and gateway tuning.
//!
//! # Usage
//!
//! ```rust,no_run
//! use drawconf::DrawConfig;
//!
//! let config = DrawConfig::load().expect("Failed to load config");
//! println!("Store dir: {}", config.paths.store_dir.display());
//! println!("Listening on {}", config.bind.address());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, tables merge key by key):
//! 1. `/etc/drawbridge/config.toml` (system)
//! 2. `~/.config/drawbridge/config.toml` (user)
//! 3. `./drawbridge.toml` or the path given with `--config` (local override)
//! 4. Environment variables (`DRAWBRIDGE_*`, plus `PORT` and `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! store_dir = "~/.drawbridge/store"
//! static_dir = "/srv/drawbridge/public"
//!
//! [bind]
//! host = "0.0.0.0"
//! http_port = 8080
//!
//! [tls]
//! enabled = true
//! hostname = "gateway.example.com"
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//!
//! [gateway]
//! cache_size = 500
//! namespace = "hyper"
//! base_domain = "gateway.example.com"
//! ```

pub mod infra;
pub mod loader;

pub use infra::{BindConfig, GatewayConfig, PathsConfig, TelemetryConfig, TlsConfig};
pub use loader::{ConfigSources, discover_config_files, expand_path};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete drawbridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DrawConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl DrawConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace `./drawbridge.toml`.
    ///
    /// System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files(config_path);
        let (mut config, mut sources) = Self::from_files(&files)?;

        loader::apply_env_overrides(&mut config, &mut sources);
        config.validate()?;

        Ok((config, sources))
    }

    /// Merge the given files in order, without looking at the environment.
    pub fn from_files(files: &[PathBuf]) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            let table = loader::load_table(path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        let origin = files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let config = loader::from_table(merged, &origin)?;

        Ok((config, sources))
    }

    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.cache_size == 0 {
            return Err(ConfigError::Invalid(
                "gateway.cache_size must be at least 1".to_string(),
            ));
        }
        if self.gateway.namespace.is_empty() || self.gateway.namespace.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "gateway.namespace must be a single path segment, got {:?}",
                self.gateway.namespace
            )));
        }
        Ok(())
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        let body = toml::to_string_pretty(self).unwrap_or_default();
        format!("# drawbridge configuration\n\n{body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = DrawConfig::default();
        assert_eq!(config.bind.http_port, 8080);
        assert_eq!(config.gateway.cache_size, 500);
        assert!(!config.tls.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_later_files_win() {
        let dir = TempDir::new().unwrap();
        let system = dir.path().join("system.toml");
        let local = dir.path().join("local.toml");
        fs::write(
            &system,
            "[bind]\nhost = \"127.0.0.1\"\nhttp_port = 80\n[gateway]\ncache_size = 10\n",
        )
        .unwrap();
        fs::write(&local, "[bind]\nhttp_port = 8443\n").unwrap();

        let (config, sources) = DrawConfig::from_files(&[system.clone(), local.clone()]).unwrap();

        assert_eq!(config.bind.host, "127.0.0.1");
        assert_eq!(config.bind.http_port, 8443);
        assert_eq!(config.gateway.cache_size, 10);
        assert_eq!(sources.files, vec![system, local]);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = DrawConfig::from_files(&[PathBuf::from("/nonexistent/drawbridge.toml")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_zero_cache_size_rejected() {
        let mut config = DrawConfig::default();
        config.gateway.cache_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_namespace_rejected() {
        let mut config = DrawConfig::default();
        config.gateway.namespace = "a/b".to_string();
        assert!(config.validate().is_err());
        config.gateway.namespace = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_reloads() {
        let mut config = DrawConfig::default();
        config.gateway.base_domain = Some("gw.example".to_string());
        config.telemetry.otlp_endpoint = Some("127.0.0.1:4317".to_string());

        let output = config.to_toml();
        assert!(output.contains("[gateway]"));
        assert!(output.contains("base_domain = \"gw.example\""));

        let reloaded: DrawConfig = toml::from_str(&output).unwrap();
        assert_eq!(reloaded, config);
    }
}
