//! Trusted proxy resolution.
//!
//! # Responsibilities
//! - Parse the trusted CIDR list once at startup
//! - Decide whether `X-Forwarded-For` may be believed for a given peer
//! - Strip the header when the peer is not trusted
//! - Publish the effective client address as a request extension
//!
//! # Design Decisions
//! - Malformed CIDR entries are logged and skipped, never fatal
//! - Bare addresses are accepted as single-host networks
//! - Only the first (client-most) forwarded token is used
//! - Malformed forwarded values fall back to the direct peer
//! - The network set is immutable and shared without locks

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request},
    middleware::Next,
    response::Response,
};
use thiserror::Error;

/// The forwarded-client header honoured from trusted proxies.
pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkParseError {
    #[error("invalid address '{0}'")]
    Address(String),
    #[error("invalid prefix length '{0}'")]
    Prefix(String),
}

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    base: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.base, normalize(addr)) {
            (IpAddr::V4(base), IpAddr::V4(addr)) => {
                let mask = mask_u32(self.prefix);
                u32::from(base) & mask == u32::from(addr) & mask
            }
            (IpAddr::V6(base), IpAddr::V6(addr)) => {
                let mask = mask_u128(self.prefix);
                u128::from(base) & mask == u128::from(addr) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpNetwork {
    type Err = NetworkParseError;

    /// Host bits are masked off, so `10.1.2.3/8` parses as `10.0.0.0/8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_part, prefix_part) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let base: IpAddr = addr_part
            .parse()
            .map_err(|_| NetworkParseError::Address(addr_part.to_string()))?;
        let max = if base.is_ipv4() { 32 } else { 128 };

        let prefix = match prefix_part {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| NetworkParseError::Prefix(p.to_string()))?,
            None => max,
        };

        let base = match base {
            IpAddr::V4(v4) => IpAddr::V4((u32::from(v4) & mask_u32(prefix)).into()),
            IpAddr::V6(v6) => IpAddr::V6((u128::from(v6) & mask_u128(prefix)).into()),
        };

        Ok(Self { base, prefix })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

fn mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

/// IPv4-mapped IPv6 peers (dual-stack sockets) compare as IPv4.
fn normalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(addr),
        v4 => v4,
    }
}

/// The set of proxies allowed to speak for their clients.
#[derive(Debug, Clone, Default)]
pub struct TrustedNetworks {
    networks: Vec<IpNetwork>,
}

impl TrustedNetworks {
    /// Parse every entry, skipping the ones that do not parse.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut networks = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.as_ref().parse::<IpNetwork>() {
                Ok(net) => networks.push(net),
                Err(e) => {
                    tracing::warn!(cidr = %entry.as_ref(), error = %e, "Invalid trusted proxy CIDR (skipped)");
                }
            }
        }
        Self { networks }
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn is_trusted(&self, addr: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(addr))
    }

    /// Effective client address for a request.
    ///
    /// The forwarded value is only consulted when the direct peer is trusted.
    pub fn resolve(&self, peer: IpAddr, forwarded: Option<&str>) -> IpAddr {
        if !self.is_trusted(peer) {
            return peer;
        }
        forwarded
            .and_then(first_forwarded_address)
            .unwrap_or(peer)
    }

    /// Resolve from an optional peer. Unknown peers are never trusted.
    pub fn resolve_client(&self, peer: Option<IpAddr>, forwarded: Option<&str>) -> ClientIp {
        ClientIp(peer.map(|peer| self.resolve(peer, forwarded)))
    }
}

fn first_forwarded_address(value: &str) -> Option<IpAddr> {
    let token = value.split(',').next()?.trim();
    token
        .parse::<IpAddr>()
        .or_else(|_| token.parse::<SocketAddr>().map(|sa| sa.ip()))
        .ok()
}

/// The effective client address, used as the rate-limit key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

impl fmt::Display for ClientIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ip) => write!(f, "{ip}"),
            None => write!(f, "unknown"),
        }
    }
}

/// Direct TCP peer, when the server was started with connect info.
pub fn peer_ip<B>(request: &Request<B>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Header value of `X-Forwarded-For`, if readable.
pub fn forwarded_for<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
}

/// Client address as the gates see it.
pub fn client_ip<B>(networks: &TrustedNetworks, request: &Request<B>) -> ClientIp {
    networks.resolve_client(peer_ip(request), forwarded_for(request))
}

/// Middleware that strips spoofable headers and records the client address.
pub async fn trusted_proxy_middleware(
    State(networks): State<Arc<TrustedNetworks>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_ip(&networks, &request);

    let peer_trusted = peer_ip(&request)
        .map(|peer| networks.is_trusted(peer))
        .unwrap_or(false);
    if !peer_trusted && request.headers().contains_key(&X_FORWARDED_FOR) {
        tracing::debug!(client = %client, "Stripping X-Forwarded-For from untrusted peer");
        request.headers_mut().remove(&X_FORWARDED_FOR);
    }

    request.extensions_mut().insert(client);
    next.run(request).await
}
