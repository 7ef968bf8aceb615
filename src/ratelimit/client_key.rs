//! Client key derivation.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

/// Errors deriving a client key from a connection.
///
/// These indicate a deployment problem (no peer address, a proxy sending
/// garbage) rather than a misbehaving client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientKeyError {
    #[error("connection has no peer address")]
    MissingPeer,

    #[error("malformed client address: {0:?}")]
    Malformed(String),
}

/// A key that identifies one client in the rate limiter table.
///
/// The key is the client's IP address; the port is dropped so every
/// connection from the same host shares a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientKey(IpAddr);

impl ClientKey {
    pub fn new(ip: IpAddr) -> Self {
        Self(ip)
    }

    /// Key for a directly connected peer.
    pub fn from_peer(addr: &SocketAddr) -> Self {
        Self(addr.ip())
    }

    /// Parse a `host:port` pair or a bare IP address.
    pub fn parse(value: &str) -> Result<Self, ClientKeyError> {
        let trimmed = value.trim();
        if let Ok(addr) = trimmed.parse::<SocketAddr>() {
            return Ok(Self::from_peer(&addr));
        }
        trimmed
            .parse::<IpAddr>()
            .map(Self)
            .map_err(|_| ClientKeyError::Malformed(value.to_string()))
    }

    /// Derive the key for a request.
    ///
    /// When a forwarded value is present its first comma-separated entry
    /// wins; otherwise the peer address is used.
    pub fn derive(
        peer: Option<&SocketAddr>,
        forwarded: Option<&str>,
    ) -> Result<Self, ClientKeyError> {
        if let Some(forwarded) = forwarded {
            let first = forwarded.split(',').next().unwrap_or_default();
            return Self::parse(first);
        }
        peer.map(Self::from_peer).ok_or(ClientKeyError::MissingPeer)
    }

    pub fn ip(&self) -> IpAddr {
        self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_peer_drops_port() {
        let a: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let b: SocketAddr = "10.0.0.1:6000".parse().unwrap();
        assert_eq!(ClientKey::from_peer(&a), ClientKey::from_peer(&b));
        assert_eq!(ClientKey::from_peer(&a).to_string(), "10.0.0.1");
    }

    #[test]
    fn test_parse_host_port_and_bare_ip() {
        assert_eq!(
            ClientKey::parse("192.168.1.7:443").unwrap().to_string(),
            "192.168.1.7"
        );
        assert_eq!(ClientKey::parse("[::1]:8080").unwrap().to_string(), "::1");
        assert_eq!(ClientKey::parse(" 172.16.0.2 ").unwrap().to_string(), "172.16.0.2");
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(
            ClientKey::parse("not-an-address"),
            Err(ClientKeyError::Malformed("not-an-address".to_string()))
        );
        assert!(ClientKey::parse("").is_err());
        assert!(ClientKey::parse("10.0.0.1:notaport").is_err());
    }

    #[test]
    fn test_derive_prefers_forwarded() {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let key = ClientKey::derive(Some(&peer), Some("203.0.113.9, 10.0.0.1")).unwrap();
        assert_eq!(key.to_string(), "203.0.113.9");
    }

    #[test]
    fn test_derive_without_peer() {
        assert_eq!(ClientKey::derive(None, None), Err(ClientKeyError::MissingPeer));
    }

    #[test]
    fn test_derive_malformed_forwarded() {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert!(matches!(
            ClientKey::derive(Some(&peer), Some("garbage")),
            Err(ClientKeyError::Malformed(_))
        ));
    }
}
