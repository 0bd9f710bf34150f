//! Certificates for the gateway's tree origins.
//!
//! Every tree is served from its own subdomain, so a gateway certificate
//! has to cover `*.<origin>` for each origin it answers on, not just the
//! bare hostname.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use drawconf::TlsConfig;
use rcgen::{CertificateParams, DnType, KeyPair};

/// Where the PEM certificate chain and private key live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl CertFiles {
    pub fn from_config(config: &TlsConfig) -> Result<Self> {
        Ok(Self {
            cert: config
                .resolved_cert_path()
                .context("No certificate path configured and no home directory")?,
            key: config
                .resolved_key_path()
                .context("No key path configured and no home directory")?,
        })
    }

    pub fn present(&self) -> bool {
        self.cert.is_file() && self.key.is_file()
    }
}

/// Subject names a self-signed gateway certificate needs: each origin and
/// its one-label wildcard, plus loopback.
pub fn gateway_names(hostname: &str, base_domain: Option<&str>) -> Vec<String> {
    let mut names = Vec::new();
    for origin in [Some(hostname), base_domain, Some("localhost")]
        .into_iter()
        .flatten()
    {
        let origin = strip_port(origin).trim_end_matches('.').to_ascii_lowercase();
        if origin.is_empty() || names.contains(&origin) {
            continue;
        }
        names.push(format!("*.{origin}"));
        names.push(origin);
    }
    names.push("127.0.0.1".to_string());
    names
}

fn strip_port(authority: &str) -> &str {
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}

/// Issue a self-signed certificate for `names` and write both PEM files.
pub fn issue_self_signed(names: &[String], files: &CertFiles) -> Result<()> {
    let mut params =
        CertificateParams::new(names.to_vec()).context("Invalid certificate subject name")?;
    params
        .distinguished_name
        .push(DnType::CommonName, "drawbridge gateway");

    let key_pair = KeyPair::generate().context("Failed to generate key pair")?;
    let cert = params
        .self_signed(&key_pair)
        .context("Failed to sign certificate")?;

    write_pem(&files.cert, &cert.pem())?;
    write_pem(&files.key, &key_pair.serialize_pem())
}

fn write_pem(path: &Path, pem: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, pem).with_context(|| format!("Failed to write {}", path.display()))
}

/// Load the listener's rustls config, pointing at `generate-cert` when the
/// files are missing.
pub async fn acceptor_config(files: &CertFiles) -> Result<RustlsConfig> {
    if !files.present() {
        anyhow::bail!(
            "TLS is enabled but {} or {} is missing.\n\
             Create a self-signed pair with: drawbridge generate-cert",
            files.cert.display(),
            files.key.display()
        );
    }

    RustlsConfig::from_pem_file(&files.cert, &files.key)
        .await
        .with_context(|| format!("Failed to load TLS material from {}", files.cert.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn files_in(dir: &TempDir) -> CertFiles {
        CertFiles::from_config(&TlsConfig {
            enabled: true,
            cert_path: Some(dir.path().join("tls/cert.pem")),
            key_path: Some(dir.path().join("tls/key.pem")),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_names_cover_tree_subdomains() {
        assert_eq!(
            gateway_names("gw.example.com", Some("Example.COM:8443")),
            vec![
                "*.gw.example.com",
                "gw.example.com",
                "*.example.com",
                "example.com",
                "*.localhost",
                "localhost",
                "127.0.0.1",
            ]
        );
    }

    #[test]
    fn test_names_skip_duplicate_origins() {
        assert_eq!(
            gateway_names("localhost", Some("localhost")),
            vec!["*.localhost", "localhost", "127.0.0.1"]
        );
    }

    #[test]
    fn test_issue_writes_pem_pair() {
        let dir = TempDir::new().unwrap();
        let files = files_in(&dir);
        assert!(!files.present());

        issue_self_signed(&gateway_names("gw.test", None), &files).unwrap();

        assert!(files.present());
        let cert = std::fs::read_to_string(&files.cert).unwrap();
        assert!(cert.starts_with("-----BEGIN CERTIFICATE-----"));
        let key = std::fs::read_to_string(&files.key).unwrap();
        assert!(key.contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn test_missing_files_point_at_generate_cert() {
        let dir = TempDir::new().unwrap();
        let err = match acceptor_config(&files_in(&dir)).await {
            Err(err) => err,
            Ok(_) => panic!("loaded TLS config without certificate files"),
        };
        assert!(err.to_string().contains("drawbridge generate-cert"));
    }
}
