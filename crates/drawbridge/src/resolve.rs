//! Path resolution inside an open tree, with single-page-app fallback.

use std::path::Path;

use tracing::debug;
use treestore::ContentTree;

use crate::error::GatewayError;

/// Served for `/`, and for extensionless paths that do not exist.
pub const INDEX_DOCUMENT: &str = "/index.html";

/// Extensions whose bodies go through the link rewriter.
const REWRITE_EXTENSIONS: &[&str] = &["html", "htm", "js", "mjs", "css"];

const FALLBACK_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// A concrete entry chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Path actually used, after any index substitution.
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub rewrite: bool,
}

impl ResolvedFile {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        Self {
            content_type: content_type_for(&name),
            rewrite: should_rewrite(&name),
            name,
            size,
        }
    }
}

/// Resolve `requested` (raw, percent-encoded) against `tree`.
///
/// A missing extensionless path falls back to [`INDEX_DOCUMENT`] once. A
/// missing path with an extension is `NotFound` straight away.
pub async fn resolve(tree: &dyn ContentTree, requested: &str) -> Result<ResolvedFile, GatewayError> {
    let decoded = urlencoding::decode(requested)
        .map_err(|_| GatewayError::NotFound(format!("undecodable path {requested}")))?;

    let path = match decoded.trim_start_matches('/') {
        "" => INDEX_DOCUMENT.to_string(),
        rest => format!("/{rest}"),
    };

    match tree.stat(&path).await {
        Ok(stat) => Ok(ResolvedFile::new(path, stat.size)),
        Err(err) if err.is_missing_entry() && !has_extension(&path) => {
            debug!(key = %tree.key(), %path, "falling back to index document");
            let stat = tree.stat(INDEX_DOCUMENT).await?;
            Ok(ResolvedFile::new(INDEX_DOCUMENT, stat.size))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn has_extension(path: &str) -> bool {
    Path::new(path).extension().is_some()
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn should_rewrite(name: &str) -> bool {
    extension(name).is_some_and(|ext| REWRITE_EXTENSIONS.contains(&ext.as_str()))
}

/// Content type from the extension. Text types are labelled UTF-8.
pub fn content_type_for(name: &str) -> String {
    let Some(mime) = mime_guess::from_path(name).first() else {
        return FALLBACK_CONTENT_TYPE.to_string();
    };
    let essence = mime.essence_str();
    let is_text = mime.type_() == mime_guess::mime::TEXT
        || matches!(essence, "application/javascript" | "application/json");
    if is_text {
        format!("{essence}; charset=utf-8")
    } else {
        essence.to_string()
    }
}
