//! Landing page and health check.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{header, Method};
use axum::response::{IntoResponse, Json};

use crate::cache::TreeCache;
use crate::chain::{GatewayRequest, Outcome, RequestHandler};

/// `GET /health`: uptime, version, and cache occupancy as JSON.
pub struct Health {
    cache: Arc<TreeCache>,
    start_time: Instant,
}

impl Health {
    pub fn new(cache: Arc<TreeCache>) -> Self {
        Self {
            cache,
            start_time: Instant::now(),
        }
    }

    pub fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "healthy",
            "uptime_secs": self.start_time.elapsed().as_secs(),
            "version": env!("CARGO_PKG_VERSION"),
            "cache": {
                "open_trees": self.cache.len(),
                "capacity": self.cache.capacity(),
                "pending_teardowns": self.cache.pending_teardowns(),
            }
        })
    }
}

#[async_trait]
impl RequestHandler for Health {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn try_handle(&self, req: &GatewayRequest) -> Result<Outcome> {
        if req.method != Method::GET || req.path != "/health" {
            return Ok(Outcome::Unhandled);
        }
        Ok(Outcome::Handled(Json(self.report()).into_response()))
    }
}

/// `GET /`: explains how to address trees through this gateway.
pub struct LandingPage {
    html: String,
}

impl LandingPage {
    pub fn new(namespace: &str, base_domain: Option<&str>) -> Self {
        let domain = base_domain.unwrap_or("this-gateway");
        let html = LANDING_HTML
            .replace("{{namespace}}", namespace)
            .replace("{{domain}}", domain)
            .replace("{{version}}", env!("CARGO_PKG_VERSION"));
        Self { html }
    }
}

#[async_trait]
impl RequestHandler for LandingPage {
    fn name(&self) -> &'static str {
        "landing"
    }

    async fn try_handle(&self, req: &GatewayRequest) -> Result<Outcome> {
        if req.method != Method::GET || req.path != "/" {
            return Ok(Outcome::Unhandled);
        }
        let response = (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            self.html.clone(),
        )
            .into_response();
        Ok(Outcome::Handled(response))
    }
}

const LANDING_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>drawbridge</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 42rem; margin: 3rem auto; padding: 0 1rem; color: #222; }
  code { background: #f3f3f3; padding: 0.1rem 0.3rem; border-radius: 3px; }
  footer { margin-top: 3rem; color: #888; font-size: 0.85rem; }
</style>
</head>
<body>
<h1>drawbridge</h1>
<p>An HTTP gateway for <code>hyper://</code> content trees.</p>
<h2>Addressing a tree</h2>
<p>Each tree gets its own origin. Put the base-32 form of its key in front of the gateway domain:</p>
<p><code>https://&lt;host-key&gt;.{{domain}}/</code></p>
<p>Hex keys work too and are redirected to the subdomain form:</p>
<p><code>https://{{domain}}/{{namespace}}/&lt;hex-key&gt;/path/to/file</code></p>
<p>Links to <code>hyper://&lt;hex-key&gt;/...</code> inside HTML, JavaScript and CSS are rewritten to point back through this gateway.</p>
<footer>drawbridge {{version}}</footer>
</body>
</html>
"##;
