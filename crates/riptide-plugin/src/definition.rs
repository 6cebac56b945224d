//! Plugin identity and matching metadata

use serde::{Deserialize, Serialize};

/// Role of a plugin in the scanning pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginType {
    PortScan,
    ServiceFingerprint,
    VulnDetection,
    /// Proxy for detectors hosted by a language server
    RemoteVulnDetection,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::PortScan => "PORT_SCAN",
            PluginType::ServiceFingerprint => "SERVICE_FINGERPRINT",
            PluginType::VulnDetection => "VULN_DETECTION",
            PluginType::RemoteVulnDetection => "REMOTE_VULN_DETECTION",
        }
    }

    pub fn is_vuln_detector(&self) -> bool {
        matches!(
            self,
            PluginType::VulnDetection | PluginType::RemoteVulnDetection
        )
    }
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operating systems a detector applies to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetOperatingSystemClass {
    #[serde(default)]
    pub vendor: Vec<String>,
    #[serde(default)]
    pub os_family: Vec<String>,
    /// Minimum accuracy of an OS guess to be considered; 0 accepts any guess
    #[serde(default)]
    pub min_accuracy: u32,
}

/// Basic identity of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub plugin_type: PluginType,
    pub name: String,
    pub author: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
}

/// Identity and matching metadata of a plugin. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDefinition {
    pub plugin_type: PluginType,
    pub name: String,
    pub author: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Service names this plugin applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service_names: Option<Vec<String>>,
    /// Software name this plugin applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_software: Option<String>,
    #[serde(default)]
    pub for_web_service: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_operating_system_class: Option<TargetOperatingSystemClass>,
    #[serde(default)]
    pub requires_callback_server: bool,
}

impl PluginDefinition {
    pub fn builder(
        plugin_type: PluginType,
        name: impl Into<String>,
        author: impl Into<String>,
        version: impl Into<String>,
    ) -> PluginDefinitionBuilder {
        PluginDefinitionBuilder {
            definition: PluginDefinition {
                plugin_type,
                name: name.into(),
                author: author.into(),
                version: version.into(),
                description: String::new(),
                target_service_names: None,
                target_software: None,
                for_web_service: false,
                target_operating_system_class: None,
                requires_callback_server: false,
            },
        }
    }

    /// Definition for a plugin advertised by a language server. Carries no filters.
    pub fn for_remote_plugin(info: PluginInfo) -> Self {
        Self::builder(info.plugin_type, info.name, info.author, info.version)
            .description(info.description)
            .build()
    }

    /// Definition for a plugin created at runtime rather than compiled in
    pub fn for_dynamic_plugin(
        plugin_type: PluginType,
        name: impl Into<String>,
        author: impl Into<String>,
        for_web_service: bool,
        requires_callback_server: bool,
    ) -> Self {
        let mut builder = Self::builder(plugin_type, name, author, "1.0");
        if for_web_service {
            builder = builder.for_web_service();
        }
        if requires_callback_server {
            builder = builder.requires_callback_server();
        }
        builder.build()
    }

    /// Stable identifier, `/{author}/{type}/{name}/{version}`
    pub fn id(&self) -> String {
        format!(
            "/{}/{}/{}/{}",
            self.author, self.plugin_type, self.name, self.version
        )
    }

    /// Whether any service, software or web filter is declared
    pub fn has_service_filters(&self) -> bool {
        self.target_service_names.is_some() || self.target_software.is_some() || self.for_web_service
    }
}

/// Builder for `PluginDefinition`
#[derive(Debug, Clone)]
pub struct PluginDefinitionBuilder {
    definition: PluginDefinition,
}

impl PluginDefinitionBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.definition.description = description.into();
        self
    }

    pub fn target_service_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition.target_service_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn target_software(mut self, name: impl Into<String>) -> Self {
        self.definition.target_software = Some(name.into());
        self
    }

    pub fn for_web_service(mut self) -> Self {
        self.definition.for_web_service = true;
        self
    }

    pub fn target_operating_system_class(mut self, class: TargetOperatingSystemClass) -> Self {
        self.definition.target_operating_system_class = Some(class);
        self
    }

    pub fn requires_callback_server(mut self) -> Self {
        self.definition.requires_callback_server = true;
        self
    }

    pub fn build(self) -> PluginDefinition {
        self.definition
    }
}
