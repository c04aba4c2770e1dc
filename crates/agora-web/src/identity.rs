//! Caller identity extraction.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use agora_board::{ConnectionMeta, Identity};

use crate::routes::AppState;

/// Identity of the caller, resolved from the connection and proxy headers.
#[derive(Debug, Clone)]
pub struct ClientIdentity(pub Identity);

impl FromRequestParts<Arc<AppState>> for ClientIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(state.resolver.resolve(&connection_meta(parts))))
    }
}

/// Collect the peer address and proxy headers of a request.
///
/// The peer is only known when the server was started with connect info.
pub fn connection_meta(parts: &Parts) -> ConnectionMeta {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    ConnectionMeta {
        peer: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip()),
        forwarded_for: header("x-forwarded-for"),
        real_ip: header("x-real-ip"),
    }
}
