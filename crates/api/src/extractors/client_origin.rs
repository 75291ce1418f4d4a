//! Client network origin, recorded on security log entries.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};

use crate::app::AppState;

/// Caller address. The socket peer, unless the peer is a trusted proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientOrigin(pub Option<IpAddr>);

impl ClientOrigin {
    /// Resolves the origin from the peer and its forwarding headers.
    ///
    /// `X-Forwarded-For` is only read when `peer` is in `trusted_proxies`.
    /// The chain is walked right to left and the first hop that is not a
    /// trusted proxy is the client.
    pub fn resolve(
        headers: &HeaderMap,
        peer: Option<IpAddr>,
        trusted_proxies: &[IpAddr],
    ) -> Option<IpAddr> {
        let peer = peer?;
        if !trusted_proxies.contains(&peer) {
            return Some(peer);
        }

        let hops: Vec<IpAddr> = headers
            .get_all("X-Forwarded-For")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
            .collect();

        Some(
            hops.iter()
                .rev()
                .find(|hop| !trusted_proxies.contains(hop))
                .or_else(|| hops.first())
                .copied()
                .unwrap_or(peer),
        )
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(Self(Self::resolve(
            &parts.headers,
            peer,
            &state.config.security.trusted_proxies,
        )))
    }
}
