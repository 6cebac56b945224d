//! Scan target and network endpoint definitions

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// An addressable endpoint: an IP, a hostname, or both, with an optional port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NetworkEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl NetworkEndpoint {
    /// Endpoint for a single IP address
    pub fn ip(addr: IpAddr) -> Self {
        Self {
            ip_address: Some(addr),
            ..Default::default()
        }
    }

    /// Endpoint for a hostname
    pub fn hostname(name: impl Into<String>) -> Self {
        Self {
            hostname: Some(name.into()),
            ..Default::default()
        }
    }

    /// Endpoint for a resolved hostname
    pub fn ip_hostname(addr: IpAddr, name: impl Into<String>) -> Self {
        Self {
            ip_address: Some(addr),
            hostname: Some(name.into()),
            port: None,
        }
    }

    /// Copy of this endpoint bound to `port`
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Host part used for connecting: IP if known, otherwise the hostname
    pub fn host(&self) -> Option<String> {
        self.ip_address
            .map(|ip| ip.to_string())
            .or_else(|| self.hostname.clone())
    }

    /// Parse an endpoint from a string, auto-detecting IP versus hostname
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidTarget(String::from("empty target")));
        }
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::ip(ip));
        }
        if s.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(Error::InvalidTarget(s.to_string()));
        }
        Ok(Self::hostname(s))
    }
}

impl std::fmt::Display for NetworkEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let host = match (&self.ip_address, &self.hostname) {
            (Some(IpAddr::V6(ip)), _) if self.port.is_some() => format!("[{}]", ip),
            (Some(ip), _) => ip.to_string(),
            (None, Some(name)) => name.clone(),
            (None, None) => String::from("<unknown>"),
        };
        match self.port {
            Some(port) => write!(f, "{}:{}", host, port),
            None => write!(f, "{}", host),
        }
    }
}

/// A target to scan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanTarget {
    pub network_endpoint: NetworkEndpoint,
}

impl ScanTarget {
    pub fn new(network_endpoint: NetworkEndpoint) -> Self {
        Self { network_endpoint }
    }

    /// Create a target from an IP address
    pub fn ip(addr: IpAddr) -> Self {
        Self::new(NetworkEndpoint::ip(addr))
    }

    /// Create a target from a hostname
    pub fn hostname(name: impl Into<String>) -> Self {
        Self::new(NetworkEndpoint::hostname(name))
    }

    /// Parse a target from a string
    pub fn parse(s: &str) -> Result<Self> {
        NetworkEndpoint::parse(s).map(Self::new)
    }
}

impl std::fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.network_endpoint)
    }
}
