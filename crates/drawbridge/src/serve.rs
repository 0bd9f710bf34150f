//! Gateway server: wiring, listeners, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use drawconf::DrawConfig;
use tracing::{info, warn};
use treestore::{DirStore, LocalSwarm, Swarm, TreeStore};

use crate::assets::StaticAssets;
use crate::cache::TreeCache;
use crate::chain::HandlerChain;
use crate::dispatch::GatewayDispatcher;
use crate::landing::{Health, LandingPage};
use crate::route::RouteResolver;
use crate::tls::{acceptor_config, CertFiles};

/// How long in-flight requests get to finish once shutdown starts.
const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// A wired gateway: the router plus the cache it shares with its handlers.
pub struct Gateway {
    pub router: Router,
    pub cache: Arc<TreeCache>,
}

impl Gateway {
    /// Build the handler chain: gateway, health, then static assets or the
    /// landing page.
    pub fn new(
        config: &DrawConfig,
        store: Arc<dyn TreeStore>,
        swarm: Arc<dyn Swarm>,
        default_scheme: &'static str,
    ) -> Self {
        let cache = Arc::new(TreeCache::new(store, swarm, config.gateway.cache_size));
        let routes = RouteResolver::from_config(&config.gateway);

        let chain = HandlerChain::new()
            .with(GatewayDispatcher::new(routes, Arc::clone(&cache)))
            .with(Health::new(Arc::clone(&cache)));

        let chain = match &config.paths.static_dir {
            Some(dir) => chain.with(StaticAssets::new(dir)),
            None => chain.with(LandingPage::new(
                &config.gateway.namespace,
                config.gateway.base_domain.as_deref(),
            )),
        };

        info!(handlers = ?chain.names(), "handler chain ready");
        Self {
            router: chain.into_router(default_scheme),
            cache,
        }
    }
}

/// Run the gateway until SIGINT/SIGTERM, then release every open tree.
pub async fn run(config: DrawConfig) -> Result<()> {
    let addr: SocketAddr = config
        .bind
        .address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind.address()))?;
    let scheme = if config.tls.enabled { "https" } else { "http" };

    info!("drawbridge starting");
    info!("   Store: {}", config.paths.store_dir.display());
    info!("   Cache: {} trees", config.gateway.cache_size);
    info!("   Legacy prefix: /{}/<hex key>/", config.gateway.namespace);
    if let Some(domain) = &config.gateway.base_domain {
        info!("   Base domain: {}", domain);
    }

    let store: Arc<dyn TreeStore> = Arc::new(DirStore::at_path(&config.paths.store_dir));
    let swarm: Arc<dyn Swarm> = Arc::new(LocalSwarm::new());
    let gateway = Gateway::new(&config, store, swarm, scheme);

    if config.tls.enabled {
        serve_tls(&config, addr, gateway.router).await?;
    } else {
        serve_plain(addr, gateway.router).await?;
    }

    gateway.cache.shutdown_all().await;
    info!("Shutdown complete");
    Ok(())
}

async fn serve_plain(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("drawbridge ready on http://{} (HTTP/1.1 and h2c)", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn serve_tls(config: &DrawConfig, addr: SocketAddr, app: Router) -> Result<()> {
    let rustls = acceptor_config(&CertFiles::from_config(&config.tls)?).await?;
    let handle = axum_server::Handle::new();

    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(GRACE_PERIOD));
    });

    info!("drawbridge ready on https://{} (HTTP/1.1 and h2)", addr);

    axum_server::bind_rustls(addr, rustls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .with_context(|| format!("Failed to serve TLS on {}", addr))
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
