//! drawbridge - HTTP gateway for `hyper://` content trees
//!
//! Subcommands:
//! - `drawbridge serve` - Run the gateway
//! - `drawbridge encode-key <hex>` - Hex key to subdomain label
//! - `drawbridge decode-key <label>` - Subdomain label to hex key
//! - `drawbridge generate-cert` - Write a self-signed certificate
//! - `drawbridge config` - Print the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drawbridge::{serve, telemetry, tls};
use drawconf::DrawConfig;
use treestore::TreeKey;

#[derive(Parser)]
#[command(name = "drawbridge")]
#[command(about = "HTTP gateway for hyper:// content trees")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway server
    Serve {
        /// Config file (replaces ./drawbridge.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to bind, overriding config
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Convert a 64-char hex key to its subdomain label
    EncodeKey {
        /// Hex key
        key: String,
    },

    /// Convert a subdomain label back to its hex key
    DecodeKey {
        /// 52-char base-32 label
        label: String,
    },

    /// Generate a self-signed TLS certificate at the configured paths
    GenerateCert {
        /// Hostname for the certificate; the configured base domain and
        /// localhost are added, each with a wildcard for tree subdomains
        #[arg(long)]
        hostname: Option<String>,

        /// Config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration and where it came from
    Config {
        /// Config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            let mut config = DrawConfig::load_from(config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(port) = port {
                config.bind.http_port = port;
            }

            telemetry::init(&config.telemetry)?;
            serve::run(config).await?;
            telemetry::shutdown();
        }
        Commands::EncodeKey { key } => {
            telemetry::init_cli();
            let key = TreeKey::from_wire(&key).context("Invalid hex key")?;
            println!("{}", key.to_host());
        }
        Commands::DecodeKey { label } => {
            telemetry::init_cli();
            let key = TreeKey::from_host(&label).context("Invalid subdomain label")?;
            println!("{}", key.to_wire());
        }
        Commands::GenerateCert {
            hostname,
            config,
            force,
        } => {
            telemetry::init_cli();
            let config = DrawConfig::load_from(config.as_deref())
                .context("Failed to load configuration")?;
            let hostname = hostname.unwrap_or_else(|| config.tls.hostname.clone());
            let files = tls::CertFiles::from_config(&config.tls)?;

            if files.present() && !force {
                anyhow::bail!(
                    "Certificates already exist at {} and {} (use --force to replace)",
                    files.cert.display(),
                    files.key.display()
                );
            }

            let names = tls::gateway_names(&hostname, config.gateway.base_domain.as_deref());
            tls::issue_self_signed(&names, &files)?;
            println!("Wrote certificate for {}", names.join(", "));
            println!("  cert: {}", files.cert.display());
            println!("  key:  {}", files.key.display());
        }
        Commands::Config { config } => {
            telemetry::init_cli();
            let (config, sources) = DrawConfig::load_with_sources_from(config.as_deref())
                .context("Failed to load configuration")?;

            for file in &sources.files {
                println!("# loaded: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env override: {}", var);
            }
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}
