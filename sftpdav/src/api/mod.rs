use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use dav_server::DavHandler;
use dav_server::memls::MemLs;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::fs::RemoteFs;

/// Upper bound for a whole WebDAV request, body transfer included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// WebDAV handler over `fs`. Locks live in memory and vanish on restart.
pub fn dav_handler(fs: RemoteFs) -> DavHandler {
    DavHandler::builder()
        .filesystem(Box::new(fs))
        .locksystem(MemLs::new())
        .build_handler()
}

/// Every path and method is answered by the WebDAV handler.
pub fn create_router(fs: RemoteFs) -> Router {
    let dav = dav_handler(fs);
    Router::new()
        .fallback(move |req: Request| {
            let dav = dav.clone();
            async move { dav.handle(req).await }
        })
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(TraceLayer::new_for_http())
}
