//! Loopback-only access guard
//!
//! The control plane is meant for a browser on the same machine. Requests
//! from any other peer, or without a known peer address, are answered as if
//! the route did not exist.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

/// Middleware rejecting non-loopback peers with an empty 404
///
/// Requires the router to be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub async fn require_loopback(request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    match peer {
        Some(addr) if is_loopback(&addr) => next.run(request).await,
        Some(addr) => {
            tracing::warn!(peer = %addr, path = %request.uri().path(), "rejected non-loopback caller");
            empty_not_found()
        }
        None => {
            tracing::warn!(path = %request.uri().path(), "rejected caller without peer address");
            empty_not_found()
        }
    }
}

/// Loopback check, including IPv4-mapped IPv6 loopback
fn is_loopback(addr: &SocketAddr) -> bool {
    match addr {
        SocketAddr::V4(v4) => v4.ip().is_loopback(),
        SocketAddr::V6(v6) => {
            v6.ip().is_loopback() || v6.ip().to_ipv4_mapped().is_some_and(|ip| ip.is_loopback())
        }
    }
}

/// 404 with an empty body
pub fn empty_not_found() -> Response {
    (StatusCode::NOT_FOUND, Body::empty()).into_response()
}
