//! drawbridge - HTTP gateway for `hyper://` content trees
//!
//! This library provides:
//! - `route`: classify requests as subdomain-addressed, legacy path, or unhandled
//! - `cache`: bounded LRU of open trees with single-flight opens and background teardown
//! - `resolve`: entry lookup with index and single-page-app fallback
//! - `rewrite`: streaming `hyper://` link rewriter
//! - `dispatch`: the gateway request handler
//! - `chain`: ordered handler chain and the `RequestHandler` contract
//! - `assets` / `landing`: static files, landing page, health check
//! - `serve`: listeners (plain h2c or TLS) and graceful shutdown

pub mod assets;
pub mod cache;
pub mod chain;
pub mod dispatch;
pub mod error;
pub mod landing;
pub mod resolve;
pub mod rewrite;
pub mod route;
pub mod serve;
pub mod telemetry;
pub mod tls;

pub use cache::TreeCache;
pub use chain::{GatewayRequest, HandlerChain, Outcome, RequestHandler};
pub use dispatch::GatewayDispatcher;
pub use error::{GatewayError, TeardownError};
pub use resolve::ResolvedFile;
pub use rewrite::{LinkRewriter, RewriteContext};
pub use route::{Route, RouteResolver};
pub use serve::Gateway;
