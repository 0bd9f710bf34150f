//! Config file discovery, loading, merging, and environment variable overlay.

use crate::{ConfigError, DrawConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local/cli).
/// Only returns files that exist. A `cli_path` that exists replaces the
/// local `./drawbridge.toml` override.
pub fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/drawbridge/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("drawbridge/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("drawbridge.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key;
/// any other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Deserialize a merged table, filling gaps with defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<DrawConfig, ConfigError> {
    let mut config: DrawConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
    expand_config_paths(&mut config);
    Ok(config)
}

fn expand_config_paths(config: &mut DrawConfig) {
    config.paths.store_dir = expand_path(&config.paths.store_dir.to_string_lossy());
    if let Some(dir) = config.paths.static_dir.take() {
        config.paths.static_dir = Some(expand_path(&dir.to_string_lossy()));
    }
    if let Some(p) = config.tls.cert_path.take() {
        config.tls.cert_path = Some(expand_path(&p.to_string_lossy()));
    }
    if let Some(p) = config.tls.key_path.take() {
        config.tls.key_path = Some(expand_path(&p.to_string_lossy()));
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut DrawConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, env::vars());
}

/// Apply overrides from an explicit set of variables.
///
/// Unparseable numeric or boolean values are ignored.
pub fn apply_overrides_from<I>(config: &mut DrawConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let applied = match key.as_str() {
            "DRAWBRIDGE_STORE_DIR" => {
                config.paths.store_dir = expand_path(&value);
                true
            }
            "DRAWBRIDGE_STATIC_DIR" => {
                config.paths.static_dir = Some(expand_path(&value));
                true
            }
            "DRAWBRIDGE_HOST" => {
                config.bind.host = value;
                true
            }
            // PORT is honoured for container platforms that inject it.
            "DRAWBRIDGE_HTTP_PORT" | "PORT" => match value.parse() {
                Ok(port) => {
                    config.bind.http_port = port;
                    true
                }
                Err(_) => false,
            },
            "DRAWBRIDGE_TLS" => match parse_bool(&value) {
                Some(enabled) => {
                    config.tls.enabled = enabled;
                    true
                }
                None => false,
            },
            "DRAWBRIDGE_TLS_CERT" => {
                config.tls.cert_path = Some(expand_path(&value));
                true
            }
            "DRAWBRIDGE_TLS_KEY" => {
                config.tls.key_path = Some(expand_path(&value));
                true
            }
            "DRAWBRIDGE_OTLP_ENDPOINT" | "OTEL_EXPORTER_OTLP_ENDPOINT" => {
                config.telemetry.otlp_endpoint = Some(value);
                true
            }
            "DRAWBRIDGE_LOG_LEVEL" | "RUST_LOG" => {
                config.telemetry.log_level = value;
                true
            }
            "DRAWBRIDGE_CACHE_SIZE" => match value.parse() {
                Ok(size) => {
                    config.gateway.cache_size = size;
                    true
                }
                Err(_) => false,
            },
            "DRAWBRIDGE_NAMESPACE" => {
                config.gateway.namespace = value;
                true
            }
            "DRAWBRIDGE_BASE_DOMAIN" => {
                config.gateway.base_domain = Some(value);
                true
            }
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        let (var_name, rest) = match stripped.find('/') {
            Some(pos) => (&stripped[..pos], Some(&stripped[pos + 1..])),
            None => (stripped, None),
        };
        if let Ok(var_value) = env::var(var_name) {
            let base = PathBuf::from(var_value);
            return match rest {
                Some(rest) => base.join(rest),
                None => base,
            };
        }
    }
    PathBuf::from(path)
}
