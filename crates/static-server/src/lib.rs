//! Static file server for the web build.
//!
//! Every response allows a root-scoped service worker and disables caching;
//! scripts, JSON and web manifests get explicit content types so browsers
//! accept them for module and manifest loading.

use std::io;
use std::net::SocketAddr;
use std::path::Path;

use axum::extract::Request;
use axum::http::header::{HeaderName, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::services::ServeDir;

pub const DEFAULT_PORT: u16 = 8000;

const SERVICE_WORKER_ALLOWED: HeaderName = HeaderName::from_static("service-worker-allowed");

/// Content type forced for a request path, by extension.
pub fn content_type_override(path: &str) -> Option<&'static str> {
    if path.ends_with(".js") {
        Some("application/javascript")
    } else if path.ends_with(".json") {
        Some("application/json")
    } else if path.ends_with(".webmanifest") {
        Some("application/manifest+json")
    } else {
        None
    }
}

async fn pwa_headers(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(SERVICE_WORKER_ALLOWED, HeaderValue::from_static("/"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if response.status().is_success() {
        if let Some(content_type) = content_type_override(&path) {
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }

    log::info!("\"{method} {path}\" {}", response.status().as_u16());
    response
}

pub fn app(root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(middleware::from_fn(pwa_headers))
}

/// Serve `root` on `addr` until Ctrl-C.
pub async fn serve(root: &Path, addr: SocketAddr) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let port = listener.local_addr()?.port();
    log::info!("Server running at http://localhost:{port}/ serving {}", root.display());
    axum::serve(listener, app(root))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("Cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            log::info!("Shutting down");
        })
        .await
}
