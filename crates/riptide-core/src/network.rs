//! Network services and reconnaissance reports

use crate::target::NetworkEndpoint;
use serde::{Deserialize, Serialize};

/// Known web service names, mapped to whether they speak plain HTTP.
const WEB_SERVICE_NAMES: &[(&str, bool)] = &[
    ("http", true),
    // Some servers are identified as this rather than "http".
    ("http-alt", true),
    ("http-proxy", true),
    ("https", false),
    // Port 8088, Hadoop Yarn web UI.
    ("radan-http", true),
    ("ssl/http", false),
    ("ssl/https", false),
];

fn web_service_entry(service_name: &str) -> Option<bool> {
    WEB_SERVICE_NAMES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(service_name))
        .map(|(_, plain)| *plain)
}

/// Transport layer protocol of a service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    #[default]
    Unspecified,
    Tcp,
    Udp,
    Sctp,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Unspecified => "UNSPECIFIED",
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Sctp => "SCTP",
        }
    }
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Software identified behind a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Software {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Software {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// A service listening on the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NetworkService {
    pub network_endpoint: NetworkEndpoint,
    #[serde(default)]
    pub transport_protocol: TransportProtocol,
    /// Service name as identified by a port scanner or fingerprinter. Empty when unknown.
    #[serde(default)]
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<Software>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub banner: Vec<String>,
    /// Root path of a web application served here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_application_root: Option<String>,
}

impl NetworkService {
    pub fn new(
        network_endpoint: NetworkEndpoint,
        transport_protocol: TransportProtocol,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            network_endpoint,
            transport_protocol,
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_software(mut self, software: Software) -> Self {
        self.software = Some(software);
        self
    }

    pub fn port(&self) -> Option<u16> {
        self.network_endpoint.port
    }

    /// Name of the identified software, empty when unknown
    pub fn software_name(&self) -> &str {
        self.software.as_ref().map(|s| s.name.as_str()).unwrap_or("")
    }

    /// Whether the service name is one of the known web service names
    pub fn is_web_service(&self) -> bool {
        web_service_entry(&self.service_name).is_some()
    }

    /// Whether the service is a web service reached without TLS
    pub fn is_plain_http(&self) -> bool {
        web_service_entry(&self.service_name).unwrap_or(false)
    }
}

impl std::fmt::Display for NetworkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = if self.service_name.is_empty() {
            "unknown"
        } else {
            &self.service_name
        };
        match self.port() {
            Some(port) => write!(f, "{} ({}, port {})", name, self.transport_protocol, port),
            None => write!(f, "{} ({})", name, self.transport_protocol),
        }
    }
}

/// One operating system guess for the target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OperatingSystemClass {
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub os_family: String,
    #[serde(default)]
    pub os_generation: String,
    /// Confidence of the guess, 0 to 100
    #[serde(default)]
    pub accuracy: u32,
}

/// What is known about the scanned host
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetInfo {
    #[serde(default)]
    pub network_endpoints: Vec<NetworkEndpoint>,
    #[serde(default)]
    pub operating_system_classes: Vec<OperatingSystemClass>,
}

impl TargetInfo {
    pub fn new(network_endpoints: Vec<NetworkEndpoint>) -> Self {
        Self {
            network_endpoints,
            operating_system_classes: Vec::new(),
        }
    }

    pub fn with_operating_system_class(mut self, class: OperatingSystemClass) -> Self {
        self.operating_system_classes.push(class);
        self
    }
}

/// Output of a port scanner
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortScanningReport {
    pub target_info: TargetInfo,
    pub network_services: Vec<NetworkService>,
}

/// Output of a service fingerprinter
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FingerprintingReport {
    pub network_services: Vec<NetworkService>,
}

/// All services known after port scanning and fingerprinting
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReconnaissanceReport {
    pub target_info: TargetInfo,
    pub network_services: Vec<NetworkService>,
}
