//! Configuration sections. Everything here is fixed for the life of the process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the local tree store.
    /// Default: ~/.drawbridge/store
    #[serde(default = "PathsConfig::default_store_dir")]
    pub store_dir: PathBuf,

    /// Directory of static assets served when no tree is addressed.
    /// Default: unset (the built-in landing page is served instead)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl PathsConfig {
    fn default_store_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".drawbridge/store"))
            .unwrap_or_else(|| PathBuf::from(".drawbridge/store"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            store_dir: Self::default_store_dir(),
            static_dir: None,
        }
    }
}

/// Listener address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// Default: 8080
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_http_port() -> u16 {
        8080
    }

    /// `host:port` suitable for `SocketAddr` parsing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            http_port: Self::default_http_port(),
        }
    }
}

/// TLS settings. Certificates default to the XDG config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    /// Hostname put in generated self-signed certificates.
    /// Default: localhost
    #[serde(default = "TlsConfig::default_hostname")]
    pub hostname: String,
}

impl TlsConfig {
    fn default_hostname() -> String {
        "localhost".to_string()
    }

    fn default_tls_dir() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.config_dir().join("drawbridge/tls"))
    }

    /// Configured cert path, or `~/.config/drawbridge/tls/cert.pem`.
    pub fn resolved_cert_path(&self) -> Option<PathBuf> {
        self.cert_path
            .clone()
            .or_else(|| Self::default_tls_dir().map(|d| d.join("cert.pem")))
    }

    /// Configured key path, or `~/.config/drawbridge/tls/key.pem`.
    pub fn resolved_key_path(&self) -> Option<PathBuf> {
        self.key_path
            .clone()
            .or_else(|| Self::default_tls_dir().map(|d| d.join("key.pem")))
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: None,
            key_path: None,
            hostname: Self::default_hostname(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint. When unset, logs go to stderr only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,

    /// EnvFilter directive (trace, debug, info, ... or a full filter).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: Self::default_log_level(),
        }
    }
}

/// Gateway behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Maximum number of open trees.
    /// Default: 500
    #[serde(default = "GatewayConfig::default_cache_size")]
    pub cache_size: usize,

    /// First path segment of legacy `/<namespace>/<hex key>/...` routes.
    /// Default: hyper
    #[serde(default = "GatewayConfig::default_namespace")]
    pub namespace: String,

    /// Domain that tree subdomains hang off (`<key>.<base_domain>`).
    /// Default: unset, meaning any authority whose first label is a key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_domain: Option<String>,
}

impl GatewayConfig {
    fn default_cache_size() -> usize {
        500
    }

    fn default_namespace() -> String {
        "hyper".to_string()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_size: Self::default_cache_size(),
            namespace: Self::default_namespace(),
            base_domain: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_defaults() {
        let paths = PathsConfig::default();
        assert!(paths.store_dir.to_string_lossy().contains("drawbridge"));
        assert!(paths.static_dir.is_none());
    }

    #[test]
    fn test_bind_defaults() {
        let bind = BindConfig::default();
        assert_eq!(bind.http_port, 8080);
        assert_eq!(bind.address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_tls_paths_prefer_configured() {
        let tls = TlsConfig {
            cert_path: Some(PathBuf::from("/etc/certs/gw.pem")),
            ..Default::default()
        };
        assert_eq!(tls.resolved_cert_path(), Some(PathBuf::from("/etc/certs/gw.pem")));
        if let Some(key) = tls.resolved_key_path() {
            assert!(key.ends_with("drawbridge/tls/key.pem"));
        }
    }

    #[test]
    fn test_gateway_defaults() {
        let gateway = GatewayConfig::default();
        assert_eq!(gateway.cache_size, 500);
        assert_eq!(gateway.namespace, "hyper");
        assert!(gateway.base_domain.is_none());
    }
}
