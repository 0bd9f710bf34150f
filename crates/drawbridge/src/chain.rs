//! Ordered request handlers, first match wins.
//!
//! The gateway, health check, static assets and landing page all implement
//! [`RequestHandler`] and sit in one [`HandlerChain`]. The chain is mounted
//! as the axum fallback so it sees every request.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::error;

/// The parts of an inbound request that handlers route on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub method: Method,
    pub scheme: String,
    /// `host[:port]`, if the client sent one.
    pub authority: Option<String>,
    pub path: String,
    pub query: Option<String>,
}

impl GatewayRequest {
    /// Build from request parts.
    ///
    /// HTTP/2 requests carry `:scheme` and `:authority` in the URI. For
    /// HTTP/1.1 the scheme comes from `X-Forwarded-Proto` or the listener,
    /// and the authority from `Host`. Only `http` and `https` are taken
    /// from the request; anything else falls back to the listener's scheme.
    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap, default_scheme: &str) -> Self {
        let scheme = uri
            .scheme_str()
            .map(str::to_ascii_lowercase)
            .filter(|v| is_web_scheme(v))
            .or_else(|| {
                headers
                    .get("x-forwarded-proto")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .map(|v| v.trim().to_ascii_lowercase())
                    .filter(|v| is_web_scheme(v))
            })
            .unwrap_or_else(|| default_scheme.to_string());

        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                headers
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            });

        Self {
            method: method.clone(),
            scheme,
            authority,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
        }
    }

    pub fn from_request<B>(req: &axum::http::Request<B>, default_scheme: &str) -> Self {
        Self::from_parts(req.method(), req.uri(), req.headers(), default_scheme)
    }

    /// Convenience constructor for a GET.
    pub fn get(scheme: &str, authority: &str, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path_and_query, None),
        };
        Self {
            method: Method::GET,
            scheme: scheme.to_string(),
            authority: Some(authority.to_string()),
            path: path.to_string(),
            query,
        }
    }
}

fn is_web_scheme(scheme: &str) -> bool {
    scheme == "http" || scheme == "https"
}

/// What a handler did with a request.
#[derive(Debug)]
pub enum Outcome {
    Handled(Response),
    Unhandled,
}

/// A link in the chain. Returning `Unhandled` passes the request on; an
/// `Err` becomes a 500.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this handler answers `HEAD` as well as `GET`.
    fn serves_head(&self) -> bool {
        false
    }

    async fn try_handle(&self, req: &GatewayRequest) -> Result<Outcome>;
}

/// Plain-text response carrying the status reason.
pub fn status_response(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("");
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        reason.to_string(),
    )
        .into_response()
}

#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn RequestHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn with_shared(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run handlers in order and produce exactly one response.
    pub async fn handle(&self, req: &GatewayRequest) -> Response {
        for handler in &self.handlers {
            match handler.try_handle(req).await {
                Ok(Outcome::Handled(response)) => return response,
                Ok(Outcome::Unhandled) => continue,
                Err(err) => {
                    error!(handler = handler.name(), path = %req.path, error = ?err, "handler failed");
                    return status_response(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }

        let head_served =
            req.method == Method::HEAD && self.handlers.iter().any(|h| h.serves_head());
        if req.method != Method::GET && !head_served {
            let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(header::ALLOW, header::HeaderValue::from_static("GET"));
            return response;
        }
        status_response(StatusCode::NOT_FOUND)
    }

    /// Mount the chain as the fallback of a traced router.
    pub fn into_router(self, default_scheme: &'static str) -> Router {
        let state = ChainState {
            chain: Arc::new(self),
            default_scheme,
        };
        Router::new()
            .fallback(run_chain)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }
}

#[derive(Clone)]
struct ChainState {
    chain: Arc<HandlerChain>,
    default_scheme: &'static str,
}

async fn run_chain(State(state): State<ChainState>, req: Request) -> Response {
    let req = GatewayRequest::from_request(&req, state.default_scheme);
    state.chain.handle(&req).await
}
