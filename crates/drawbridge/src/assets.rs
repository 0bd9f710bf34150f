//! Static assets from a local directory, with single-page-app routing.

use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::chain::{GatewayRequest, Outcome, RequestHandler};
use crate::resolve::{content_type_for, has_extension, INDEX_DOCUMENT};

pub struct StaticAssets {
    root: PathBuf,
}

impl StaticAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path onto a file under the root. Extensionless paths
    /// map to the index document; anything escaping the root maps to none.
    fn file_for(&self, request_path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(request_path).ok()?;
        let path = if has_extension(&decoded) {
            &*decoded
        } else {
            INDEX_DOCUMENT
        };

        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => return None,
            }
        }
        Some(resolved)
    }
}

#[async_trait]
impl RequestHandler for StaticAssets {
    fn name(&self) -> &'static str {
        "static"
    }

    fn serves_head(&self) -> bool {
        true
    }

    async fn try_handle(&self, req: &GatewayRequest) -> Result<Outcome> {
        if req.method != Method::GET && req.method != Method::HEAD {
            return Ok(Outcome::Unhandled);
        }
        let Some(path) = self.file_for(&req.path) else {
            debug!(path = %req.path, "static path rejected");
            return Ok(Outcome::Unhandled);
        };

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Outcome::Unhandled),
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Ok(Outcome::Unhandled);
        }

        let body = if req.method == Method::HEAD {
            Body::empty()
        } else {
            Body::from_stream(ReaderStream::new(file))
        };

        let content_type = content_type_for(&path.to_string_lossy());
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, HeaderValue::from(meta.len()))
            .body(body)?;
        Ok(Outcome::Handled(response))
    }
}
