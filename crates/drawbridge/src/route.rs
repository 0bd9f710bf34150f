//! Request classification: subdomain-addressed, legacy path, or not ours.

use axum::http::Method;
use drawconf::GatewayConfig;
use tracing::debug;
use treestore::{is_valid_host_key, TreeKey, WIRE_KEY_LEN};

use crate::chain::GatewayRequest;
use crate::rewrite::RewriteContext;

/// Result of classifying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Not a gateway request; let the next handler try.
    Unhandled,
    /// Legacy path form; send the client to the subdomain form.
    Redirect { location: String },
    /// Serve `residual_path` from the tree at `key`.
    Serve {
        key: TreeKey,
        residual_path: String,
        /// Authority after the key label, port included.
        origin: String,
    },
}

impl Route {
    /// Where links rewritten for this request should point.
    pub fn rewrite_context(&self, req: &GatewayRequest) -> Option<RewriteContext> {
        match self {
            Route::Serve { origin, .. } => Some(RewriteContext::new(&req.scheme, origin)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteResolver {
    namespace: String,
    base_domain: Option<String>,
}

impl RouteResolver {
    pub fn new(namespace: impl Into<String>, base_domain: Option<String>) -> Self {
        Self {
            namespace: namespace.into(),
            base_domain: base_domain.map(|d| d.trim_end_matches('.').to_ascii_lowercase()),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.namespace.clone(), config.base_domain.clone())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Subdomain form is tried first and always wins over the path form.
    pub fn classify(&self, req: &GatewayRequest) -> Route {
        if req.method != Method::GET {
            return Route::Unhandled;
        }
        let Some(authority) = req.authority.as_deref() else {
            return Route::Unhandled;
        };

        if let Some(route) = self.classify_subdomain(authority, &req.path) {
            return route;
        }
        self.classify_legacy_path(req, authority)
            .unwrap_or(Route::Unhandled)
    }

    fn classify_subdomain(&self, authority: &str, path: &str) -> Option<Route> {
        let (hostname, port) = split_port(authority);
        let (label, rest) = hostname.split_once('.')?;
        if rest.is_empty() || !is_valid_host_key(label) {
            return None;
        }
        if let Some(base) = &self.base_domain {
            if !rest.trim_end_matches('.').eq_ignore_ascii_case(base) {
                return None;
            }
        }

        let key = match TreeKey::from_host(label) {
            Ok(key) => key,
            Err(err) => {
                debug!(label, error = %err, "host label rejected");
                return None;
            }
        };

        let origin = match port {
            Some(port) => format!("{rest}:{port}"),
            None => rest.to_string(),
        };

        Some(Route::Serve {
            key,
            residual_path: non_empty_path(path),
            origin,
        })
    }

    /// `/<namespace>/<64 hex>[/rest]` on any authority.
    fn classify_legacy_path(&self, req: &GatewayRequest, authority: &str) -> Option<Route> {
        let rest = req.path.strip_prefix('/')?;
        let (namespace, rest) = rest.split_once('/')?;
        if !namespace.eq_ignore_ascii_case(&self.namespace) {
            return None;
        }

        let wire = rest.get(..WIRE_KEY_LEN)?;
        let residual = &rest[WIRE_KEY_LEN..];
        if !(residual.is_empty() || residual.starts_with('/')) {
            return None;
        }

        let key = match TreeKey::from_wire(wire) {
            Ok(key) => key,
            Err(err) => {
                debug!(path = %req.path, error = %err, "legacy path key rejected");
                return None;
            }
        };

        let mut location = format!(
            "{}://{}.{}{}",
            req.scheme,
            key.to_host(),
            authority,
            non_empty_path(residual)
        );
        if let Some(query) = &req.query {
            location.push('?');
            location.push_str(query);
        }

        Some(Route::Redirect { location })
    }
}

fn non_empty_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Split `host:port`, leaving bracketed IPv6 literals intact.
fn split_port(authority: &str) -> (&str, Option<&str>) {
    let host_end = if authority.starts_with('[') {
        authority.find(']').map(|i| i + 1).unwrap_or(authority.len())
    } else {
        authority.rfind(':').unwrap_or(authority.len())
    };
    let (host, tail) = authority.split_at(host_end);
    match tail.strip_prefix(':') {
        Some(port) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host, Some(port))
        }
        _ => (authority, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WIRE: &str = "34f4c3f0bcf6bf5c39d7814d373946d8f04da5b4a525d940c98309cafb111d93";
    const HOST: &str = "6ktc7w5wytznreeqg56keea6v3r4v9dmmmjxjg69gc4wnyrh3p9g";

    fn resolver() -> RouteResolver {
        RouteResolver::new("hyper", None)
    }

    fn key() -> TreeKey {
        TreeKey::from_wire(WIRE).unwrap()
    }

    #[test]
    fn test_legacy_path_redirects() {
        let req = GatewayRequest::get("https", "example.com", &format!("/hyper/{WIRE}/foo.js"));
        assert_eq!(
            resolver().classify(&req),
            Route::Redirect {
                location: format!("https://{HOST}.example.com/foo.js")
            }
        );
    }

    #[test]
    fn test_legacy_path_keeps_scheme_port_and_query() {
        let req = GatewayRequest::get(
            "http",
            "localhost:8080",
            &format!("/HYPER/{}?v=2", WIRE.to_uppercase()),
        );
        assert_eq!(
            resolver().classify(&req),
            Route::Redirect {
                location: format!("http://{HOST}.localhost:8080/?v=2")
            }
        );
    }

    #[test]
    fn test_legacy_path_rejects_near_misses() {
        let cases = [
            format!("/hyper/{}", &WIRE[..63]),
            format!("/hyper/{WIRE}0/x"),
            format!("/hyper/{}z/x", &WIRE[..63]),
            format!("/other/{WIRE}/x"),
            format!("/hyper{WIRE}"),
        ];
        for path in cases {
            let req = GatewayRequest::get("https", "example.com", &path);
            assert_eq!(resolver().classify(&req), Route::Unhandled, "{path}");
        }
    }

    #[test]
    fn test_subdomain_serves() {
        let req = GatewayRequest::get("https", &format!("{HOST}.example.com"), "/");
        assert_eq!(
            resolver().classify(&req),
            Route::Serve {
                key: key(),
                residual_path: "/".to_string(),
                origin: "example.com".to_string(),
            }
        );
    }

    #[test]
    fn test_subdomain_is_case_insensitive_and_keeps_port() {
        let authority = format!("{}.Example.com:8443", HOST.to_uppercase());
        let req = GatewayRequest::get("https", &authority, "");
        assert_eq!(
            resolver().classify(&req),
            Route::Serve {
                key: key(),
                residual_path: "/".to_string(),
                origin: "Example.com:8443".to_string(),
            }
        );
    }

    #[test]
    fn test_subdomain_wins_over_path_form() {
        let req = GatewayRequest::get(
            "https",
            &format!("{HOST}.example.com"),
            &format!("/hyper/{WIRE}/a.js"),
        );
        match resolver().classify(&req) {
            Route::Serve { residual_path, .. } => {
                assert_eq!(residual_path, format!("/hyper/{WIRE}/a.js"))
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn test_base_domain_restricts_subdomains() {
        let resolver = RouteResolver::new("hyper", Some("gw.example.com".to_string()));

        let ok = GatewayRequest::get("https", &format!("{HOST}.gw.example.com"), "/");
        assert!(matches!(resolver.classify(&ok), Route::Serve { .. }));

        let other = GatewayRequest::get("https", &format!("{HOST}.elsewhere.com"), "/");
        assert_eq!(resolver.classify(&other), Route::Unhandled);
    }

    #[test]
    fn test_bare_key_host_is_unhandled() {
        let req = GatewayRequest::get("https", HOST, "/");
        assert_eq!(resolver().classify(&req), Route::Unhandled);
    }

    #[test]
    fn test_non_canonical_host_key_is_unhandled() {
        // Last char 'h' sets padding bits.
        let mut host = HOST.to_string();
        host.pop();
        host.push('h');
        let req = GatewayRequest::get("https", &format!("{host}.example.com"), "/");
        assert_eq!(resolver().classify(&req), Route::Unhandled);
    }

    #[test]
    fn test_non_get_is_unhandled() {
        let mut req = GatewayRequest::get("https", &format!("{HOST}.example.com"), "/");
        req.method = Method::POST;
        assert_eq!(resolver().classify(&req), Route::Unhandled);
    }

    #[test]
    fn test_rewrite_context_uses_origin() {
        let req = GatewayRequest::get("http", &format!("{HOST}.localhost:8080"), "/");
        let route = resolver().classify(&req);
        assert_eq!(
            route.rewrite_context(&req),
            Some(RewriteContext::new("http", "localhost:8080"))
        );
    }

    #[test]
    fn test_split_port() {
        assert_eq!(split_port("a.b:80"), ("a.b", Some("80")));
        assert_eq!(split_port("a.b"), ("a.b", None));
        assert_eq!(split_port("[::1]:8080"), ("[::1]", Some("8080")));
        assert_eq!(split_port("[::1]"), ("[::1]", None));
    }
}
