//! Caller identity derived from connection metadata.
//!
//! An identity is an opaque string used for ownership and like-membership
//! checks. It is not an authenticated account: callers sharing a proxy or NAT
//! address collide.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Identity token for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Token used when nothing in the request identifies the caller.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Connection metadata available when a request arrives.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMeta {
    /// Directly observed peer address.
    pub peer: Option<IpAddr>,
    /// Raw `X-Forwarded-For` header value.
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` header value.
    pub real_ip: Option<String>,
}

/// Derives an [`Identity`] from [`ConnectionMeta`].
///
/// By default the peer address wins, then the first `X-Forwarded-For` entry,
/// then `X-Real-IP`, then [`Identity::UNKNOWN`]. With `trust_proxy` the two
/// headers are consulted before the peer address.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver {
    trust_proxy: bool,
}

impl IdentityResolver {
    pub fn new(trust_proxy: bool) -> Self {
        Self { trust_proxy }
    }

    pub fn trusts_proxy(&self) -> bool {
        self.trust_proxy
    }

    pub fn resolve(&self, meta: &ConnectionMeta) -> Identity {
        let peer = meta.peer.map(|ip| ip.to_string());
        let forwarded = meta
            .forwarded_for
            .as_deref()
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        let real_ip = meta
            .real_ip
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let resolved = if self.trust_proxy {
            forwarded.or(real_ip).or(peer)
        } else {
            peer.or(forwarded).or(real_ip)
        };

        resolved.map(Identity).unwrap_or_else(Identity::unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn meta(peer: Option<&str>, forwarded: Option<&str>, real_ip: Option<&str>) -> ConnectionMeta {
        ConnectionMeta {
            peer: peer.map(|p| p.parse().unwrap()),
            forwarded_for: forwarded.map(String::from),
            real_ip: real_ip.map(String::from),
        }
    }

    #[test_case(Some("10.0.0.1"), Some("1.1.1.1, 2.2.2.2"), Some("3.3.3.3") => "10.0.0.1" ; "peer wins")]
    #[test_case(None, Some("1.1.1.1, 2.2.2.2"), Some("3.3.3.3") => "1.1.1.1" ; "first forwarded entry")]
    #[test_case(None, None, Some(" 3.3.3.3 ") => "3.3.3.3" ; "real ip trimmed")]
    #[test_case(None, Some("  "), None => "unknown" ; "blank forwarded ignored")]
    #[test_case(None, None, None => "unknown" ; "nothing known")]
    fn resolves_in_default_order(
        peer: Option<&str>,
        forwarded: Option<&str>,
        real_ip: Option<&str>,
    ) -> String {
        IdentityResolver::default()
            .resolve(&meta(peer, forwarded, real_ip))
            .to_string()
    }

    #[test_case(Some("10.0.0.1"), Some("1.1.1.1"), None => "1.1.1.1" ; "forwarded before peer")]
    #[test_case(Some("10.0.0.1"), None, Some("3.3.3.3") => "3.3.3.3" ; "real ip before peer")]
    #[test_case(Some("10.0.0.1"), None, None => "10.0.0.1" ; "peer as fallback")]
    fn resolves_behind_trusted_proxy(
        peer: Option<&str>,
        forwarded: Option<&str>,
        real_ip: Option<&str>,
    ) -> String {
        IdentityResolver::new(true)
            .resolve(&meta(peer, forwarded, real_ip))
            .to_string()
    }

    #[test]
    fn ipv6_peer_is_rendered_canonically() {
        let identity = IdentityResolver::default().resolve(&meta(Some("::1"), None, None));
        assert_eq!(identity.as_str(), "::1");
    }

    proptest! {
        #[test]
        fn never_returns_empty(
            forwarded in proptest::option::of("[ ,0-9.]{0,20}"),
            real_ip in proptest::option::of("[ 0-9.]{0,20}"),
            trust in proptest::bool::ANY,
        ) {
            let meta = ConnectionMeta { peer: None, forwarded_for: forwarded, real_ip };
            let identity = IdentityResolver::new(trust).resolve(&meta);
            prop_assert!(!identity.as_str().is_empty());
        }
    }
}
