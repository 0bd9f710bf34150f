//! The gateway handler: classify, acquire, resolve, stream.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, error};
use treestore::{ByteStream, TreeKey};

use crate::cache::{TreeCache, TreeLease};
use crate::chain::{status_response, GatewayRequest, Outcome, RequestHandler};
use crate::error::GatewayError;
use crate::resolve::{resolve, ResolvedFile};
use crate::rewrite::{rewrite_stream, RewriteContext};
use crate::route::{Route, RouteResolver};

pub struct GatewayDispatcher {
    routes: RouteResolver,
    cache: Arc<TreeCache>,
}

impl GatewayDispatcher {
    pub fn new(routes: RouteResolver, cache: Arc<TreeCache>) -> Self {
        Self { routes, cache }
    }

    pub fn cache(&self) -> &Arc<TreeCache> {
        &self.cache
    }

    async fn serve(&self, key: &TreeKey, path: &str, ctx: RewriteContext) -> Response {
        match self.stream_file(key, path, ctx).await {
            Ok(response) => response,
            Err(err) => {
                let status = status_for(&err);
                if err.is_client_error() {
                    debug!(%key, path, error = %err, "not serving");
                } else {
                    error!(%key, path, error = %err, "failed to serve");
                }
                status_response(status)
            }
        }
    }

    async fn stream_file(
        &self,
        key: &TreeKey,
        path: &str,
        ctx: RewriteContext,
    ) -> Result<Response, GatewayError> {
        let tree = self.cache.acquire(key).await?;
        let file = resolve(&*tree, path).await?;
        let body = tree.read_stream(&file.name).await?;

        debug!(%key, path, name = %file.name, size = file.size, rewrite = file.rewrite, "streaming");

        let body = if file.rewrite {
            rewrite_stream(body, ctx)
        } else {
            body
        };
        Ok(file_response(&file, hold_for_body(body, tree, &file.name)))
    }
}

#[async_trait]
impl RequestHandler for GatewayDispatcher {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn try_handle(&self, req: &GatewayRequest) -> Result<Outcome> {
        let route = self.routes.classify(req);
        let ctx = route.rewrite_context(req);
        match (route, ctx) {
            (Route::Redirect { location }, _) => {
                debug!(path = %req.path, %location, "redirecting to subdomain form");
                Ok(Outcome::Handled(redirect(location)))
            }
            (
                Route::Serve {
                    key, residual_path, ..
                },
                Some(ctx),
            ) => Ok(Outcome::Handled(self.serve(&key, &residual_path, ctx).await)),
            _ => Ok(Outcome::Unhandled),
        }
    }
}

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::Store(_) | GatewayError::Swarm(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn redirect(location: String) -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

/// 200 with public CORS. The length is only known when the body is not
/// rewritten.
fn file_response(file: &ResolvedFile, body: ByteStream) -> Response {
    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&file.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    if !file.rewrite {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.size));
    }
    response
}

/// Keep the lease until the body is dropped, logging read failures.
fn hold_for_body(body: ByteStream, lease: TreeLease, name: &str) -> ByteStream {
    let key = *lease.key();
    let name = name.to_string();
    body.inspect_err(move |err| {
        error!(%key, name = %name, error = %err, "read failed mid-stream");
    })
    .map(move |chunk| {
        let _lease = &lease;
        chunk
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use treestore::{LocalSwarm, MemoryStore};

    const WIRE: &str = "34f4c3f0bcf6bf5c39d7814d373946d8f04da5b4a525d940c98309cafb111d93";
    const HOST: &str = "6ktc7w5wytznreeqg56keea6v3r4v9dmmmjxjg69gc4wnyrh3p9g";

    fn dispatcher(store: Arc<MemoryStore>) -> GatewayDispatcher {
        let cache = Arc::new(TreeCache::new(store, Arc::new(LocalSwarm::new()), 8));
        GatewayDispatcher::new(RouteResolver::new("hyper", None), cache)
    }

    async fn handled(d: &GatewayDispatcher, req: GatewayRequest) -> Response {
        match d.try_handle(&req).await.unwrap() {
            Outcome::Handled(response) => response,
            Outcome::Unhandled => panic!("expected the gateway to handle {}", req.path),
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new().with_chunk_size(7));
        store.insert_tree(
            TreeKey::from_wire(WIRE).unwrap(),
            [
                ("/index.html", format!("<script src=\"hyper://{WIRE}/app.js\"></script>")),
                ("/raw.txt", format!("hyper://{WIRE}/app.js")),
            ],
        );
        store
    }

    #[tokio::test]
    async fn test_unrelated_request_is_unhandled() {
        let d = dispatcher(store());
        let outcome = d
            .try_handle(&GatewayRequest::get("https", "example.com", "/about"))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Unhandled));
    }

    #[tokio::test]
    async fn test_redirect_has_location() {
        let d = dispatcher(store());
        let response = handled(
            &d,
            GatewayRequest::get("https", "example.com", &format!("/hyper/{WIRE}/a.js")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("https://{HOST}.example.com/a.js").as_str()
        );
    }

    #[tokio::test]
    async fn test_html_is_rewritten_without_length() {
        let d = dispatcher(store());
        let response = handled(
            &d,
            GatewayRequest::get("https", &format!("{HOST}.example.com"), "/"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(
            body_text(response).await,
            format!("<script src=\"https://{HOST}.example.com/app.js\"></script>")
        );
    }

    #[tokio::test]
    async fn test_plain_file_is_untouched_with_length() {
        let d = dispatcher(store());
        let response = handled(
            &d,
            GatewayRequest::get("https", &format!("{HOST}.example.com"), "/raw.txt"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let expected = format!("hyper://{WIRE}/app.js");
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            expected.len().to_string().as_str()
        );
        assert_eq!(body_text(response).await, expected);
    }

    #[tokio::test]
    async fn test_missing_asset_is_404() {
        let d = dispatcher(store());
        let response = handled(
            &d,
            GatewayRequest::get("https", &format!("{HOST}.example.com"), "/nope.png"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_tree_is_404() {
        let d = dispatcher(Arc::new(MemoryStore::new()));
        let response = handled(
            &d,
            GatewayRequest::get("https", &format!("{HOST}.example.com"), "/"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(d.cache().is_empty());
    }

    #[tokio::test]
    async fn test_response_body_keeps_evicted_tree_open() {
        let store = store();
        let other = TreeKey::from_bytes([0x42; 32]);
        store.insert_tree(other, [("/index.html", "other")]);
        let cache = Arc::new(TreeCache::new(store.clone(), Arc::new(LocalSwarm::new()), 1));
        let d = GatewayDispatcher::new(RouteResolver::new("hyper", None), cache);

        let first = handled(
            &d,
            GatewayRequest::get("https", &format!("{HOST}.example.com"), "/raw.txt"),
        )
        .await;
        let second = handled(
            &d,
            GatewayRequest::get("https", &format!("{}.example.com", other.to_host()), "/"),
        )
        .await;
        assert_eq!(body_text(second).await, "other");

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.closes(), 0);
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_text(first).await, format!("hyper://{WIRE}/app.js"));

        d.cache().wait_for_teardowns().await;
        assert_eq!(store.closes(), 1);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&GatewayError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&GatewayError::Store(treestore::StoreError::Closed)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
