//! Built-in TCP connect port scanner

use riptide_core::{
    Error, NetworkEndpoint, NetworkService, PortScanningReport, Result, ScanTarget, TargetInfo,
    TransportProtocol,
};
use riptide_plugin::{PluginDefinition, PluginType, PortScanner};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, trace};

/// Common port lists
pub mod ports {
    /// Top 100 most common TCP ports
    pub const TOP_100: &[u16] = &[
        7, 9, 13, 21, 22, 23, 25, 26, 37, 53, 79, 80, 81, 88, 106, 110, 111, 113, 119, 135, 139,
        143, 144, 179, 199, 389, 427, 443, 444, 445, 465, 513, 514, 515, 543, 544, 548, 554, 587,
        631, 646, 873, 990, 993, 995, 1025, 1026, 1027, 1028, 1029, 1110, 1433, 1720, 1723, 1755,
        1900, 2000, 2001, 2049, 2121, 2717, 3000, 3128, 3306, 3389, 3986, 4899, 5000, 5009, 5051,
        5060, 5101, 5190, 5357, 5432, 5631, 5666, 5800, 5900, 6000, 6001, 6646, 7070, 8000, 8008,
        8009, 8080, 8081, 8443, 8888, 9100, 9999, 10000, 32768, 49152, 49153, 49154, 49155, 49156,
    ];

    /// Parse a port specification such as "80", "80,443", "1-1024" or "22,8000-9000".
    /// The result is sorted and deduplicated.
    pub fn parse_port_spec(spec: &str) -> Result<Vec<u16>, String> {
        let mut ports = Vec::new();

        for part in spec.split(',') {
            let part = part.trim();
            if let Some((start, end)) = part.split_once('-') {
                let start: u16 = start
                    .trim()
                    .parse()
                    .map_err(|_| format!("Invalid port: {}", start))?;
                let end: u16 = end
                    .trim()
                    .parse()
                    .map_err(|_| format!("Invalid port: {}", end))?;
                if start > end {
                    return Err(format!("Invalid range: {} > {}", start, end));
                }
                ports.extend(start..=end);
            } else {
                let port: u16 = part
                    .parse()
                    .map_err(|_| format!("Invalid port: {}", part))?;
                ports.push(port);
            }
        }

        ports.sort_unstable();
        ports.dedup();
        Ok(ports)
    }
}

/// Well-known service name for a TCP port, empty if unknown
pub fn service_name_for_port(port: u16) -> &'static str {
    match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        80 | 81 | 8008 => "http",
        110 => "pop3",
        111 => "rpcbind",
        135 => "msrpc",
        139 => "netbios-ssn",
        143 => "imap",
        389 => "ldap",
        443 => "https",
        445 => "microsoft-ds",
        465 => "smtps",
        587 => "submission",
        993 => "imaps",
        995 => "pop3s",
        1433 => "ms-sql-s",
        2049 => "nfs",
        3000 => "ppp",
        3306 => "mysql",
        3389 => "ms-wbt-server",
        5432 => "postgresql",
        5900 => "vnc",
        6379 => "redis",
        8000 => "http-alt",
        8080 => "http-proxy",
        8443 => "https-alt",
        8888 => "sun-answerbook",
        9200 => "elasticsearch",
        11211 => "memcache",
        27017 => "mongod",
        _ => "",
    }
}

/// Port scanner configuration
#[derive(Debug, Clone)]
pub struct PortScanConfig {
    /// Ports to scan
    pub ports: Vec<u16>,
    /// Timeout per connection attempt
    pub timeout: Duration,
    /// Maximum concurrent connection attempts
    pub concurrency: usize,
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            ports: ports::TOP_100.to_vec(),
            timeout: Duration::from_millis(1500),
            concurrency: 100,
        }
    }
}

/// Reports every port that accepts a TCP connection as a network service
#[derive(Debug, Clone, Default)]
pub struct TcpConnectPortScanner {
    config: PortScanConfig,
}

impl TcpConnectPortScanner {
    pub fn definition() -> PluginDefinition {
        PluginDefinition::builder(PluginType::PortScan, "TcpConnectPortScanner", "riptide", "0.1")
            .description("TCP connect port scanner")
            .build()
    }

    pub fn with_config(config: PortScanConfig) -> Self {
        Self { config }
    }

    async fn resolve(endpoint: &NetworkEndpoint) -> Result<IpAddr> {
        if let Some(ip) = endpoint.ip_address {
            return Ok(ip);
        }
        let hostname = endpoint
            .hostname
            .as_deref()
            .ok_or_else(|| Error::InvalidTarget(String::from("target has no address")))?;
        let mut addrs = tokio::net::lookup_host((hostname, 0)).await?;
        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| Error::InvalidTarget(format!("could not resolve {}", hostname)))
    }

    async fn is_open(addr: SocketAddr, connect_timeout: Duration) -> bool {
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => {
                debug!("Port {} is open", addr);
                true
            }
            Ok(Err(e)) => {
                trace!("Port {} closed: {}", addr, e);
                false
            }
            Err(_) => {
                trace!("Port {} timeout (filtered)", addr);
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl PortScanner for TcpConnectPortScanner {
    async fn scan(&self, target: &ScanTarget) -> Result<PortScanningReport> {
        let endpoint = &target.network_endpoint;
        let ip = Self::resolve(endpoint).await?;
        info!(target = %target, ip = %ip, ports = self.config.ports.len(), "TCP connect scan");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(self.config.ports.len());
        for &port in &self.config.ports {
            let semaphore = Arc::clone(&semaphore);
            let connect_timeout = self.config.timeout;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Self::is_open(SocketAddr::new(ip, port), connect_timeout)
                    .await
                    .then_some(port)
            }));
        }

        let mut open_ports = Vec::new();
        for handle in handles {
            if let Ok(Some(port)) = handle.await {
                open_ports.push(port);
            }
        }
        open_ports.sort_unstable();

        let service_endpoint = NetworkEndpoint {
            ip_address: Some(ip),
            hostname: endpoint.hostname.clone(),
            port: None,
        };
        let network_services = open_ports
            .into_iter()
            .map(|port| {
                NetworkService::new(
                    service_endpoint.clone().with_port(port),
                    TransportProtocol::Tcp,
                    service_name_for_port(port),
                )
            })
            .collect();

        Ok(PortScanningReport {
            target_info: TargetInfo::new(vec![endpoint.clone()]),
            network_services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_port_spec_single() {
        assert_eq!(ports::parse_port_spec("80").unwrap(), vec![80]);
    }

    #[test]
    fn test_parse_port_spec_mixed() {
        let ports = ports::parse_port_spec("22,80,443,8000-8002").unwrap();
        assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
    }

    #[test]
    fn test_parse_port_spec_dedup() {
        assert_eq!(ports::parse_port_spec("443,80,80").unwrap(), vec![80, 443]);
    }

    #[test]
    fn test_parse_port_spec_invalid() {
        assert!(ports::parse_port_spec("80,http").is_err());
        assert!(ports::parse_port_spec("90-80").is_err());
        assert!(ports::parse_port_spec("70000").is_err());
    }

    #[test]
    fn test_service_names() {
        assert_eq!(service_name_for_port(22), "ssh");
        assert_eq!(service_name_for_port(443), "https");
        assert_eq!(service_name_for_port(31337), "");
    }

    #[test]
    fn test_definition_id() {
        assert_eq!(
            TcpConnectPortScanner::definition().id(),
            "/riptide/PORT_SCAN/TcpConnectPortScanner/0.1"
        );
    }

    #[tokio::test]
    async fn test_scan_finds_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        let closed_port = {
            let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
            closed.local_addr().unwrap().port()
        };

        let scanner = TcpConnectPortScanner::with_config(PortScanConfig {
            ports: vec![open_port, closed_port],
            timeout: Duration::from_secs(2),
            concurrency: 4,
        });
        let report = scanner
            .scan(&ScanTarget::parse("127.0.0.1").unwrap())
            .await
            .unwrap();

        assert_eq!(report.network_services.len(), 1);
        let service = &report.network_services[0];
        assert_eq!(service.port(), Some(open_port));
        assert_eq!(service.transport_protocol, TransportProtocol::Tcp);
        drop(listener);
    }
}
