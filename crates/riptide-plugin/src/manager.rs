//! Plugin manager - selects which plugins apply to which services

use crate::definition::{PluginDefinition, PluginType, TargetOperatingSystemClass};
use crate::plugin::{MatchedPlugin, Plugin, PortScanner, ServiceFingerprinter, VulnDetector};
use crate::registry::PluginRegistry;
use riptide_common::config::{CallbackServerConfig, PluginManagerConfig};
use riptide_core::{NetworkService, ReconnaissanceReport, TargetInfo};
use std::sync::Arc;
use tracing::{debug, warn};

/// A plugin selected for a run, with the services it was matched against
pub struct PluginMatchingResult<T: ?Sized> {
    pub plugin_definition: PluginDefinition,
    pub plugin: Arc<T>,
    pub matched_services: Vec<NetworkService>,
}

impl<T: ?Sized> PluginMatchingResult<T> {
    pub fn new(
        plugin_definition: PluginDefinition,
        plugin: Arc<T>,
        matched_services: Vec<NetworkService>,
    ) -> Self {
        Self {
            plugin_definition,
            plugin,
            matched_services,
        }
    }

    pub fn plugin_id(&self) -> String {
        self.plugin_definition.id()
    }
}

impl<T: ?Sized> Clone for PluginMatchingResult<T> {
    fn clone(&self) -> Self {
        Self {
            plugin_definition: self.plugin_definition.clone(),
            plugin: Arc::clone(&self.plugin),
            matched_services: self.matched_services.clone(),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for PluginMatchingResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginMatchingResult")
            .field("plugin_id", &self.plugin_id())
            .field("matched_services", &self.matched_services.len())
            .finish()
    }
}

/// Read-only queries over the plugin registry
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
    detectors_include: Vec<String>,
    detectors_exclude: Vec<String>,
    callback_server_enabled: bool,
}

impl PluginManager {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            detectors_include: Vec::new(),
            detectors_exclude: Vec::new(),
            callback_server_enabled: false,
        }
    }

    pub fn from_config(
        registry: Arc<PluginRegistry>,
        manager: &PluginManagerConfig,
        callback_server: &CallbackServerConfig,
    ) -> Self {
        Self::new(registry)
            .with_detectors_include(manager.detectors_include.clone())
            .with_detectors_exclude(manager.detectors_exclude.clone())
            .with_callback_server_enabled(callback_server.enabled)
    }

    /// Only run detectors with these names (empty = all)
    pub fn with_detectors_include(mut self, names: Vec<String>) -> Self {
        self.detectors_include = names;
        self
    }

    pub fn with_detectors_exclude(mut self, names: Vec<String>) -> Self {
        self.detectors_exclude = names;
        self
    }

    pub fn with_callback_server_enabled(mut self, enabled: bool) -> Self {
        self.callback_server_enabled = enabled;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// All port scanners, in registration order. Port scanners act on the whole
    /// target, so none carries matched services.
    pub fn port_scanners(&self) -> Vec<PluginMatchingResult<dyn PortScanner>> {
        self.registry
            .by_type(PluginType::PortScan)
            .filter_map(|(definition, factory)| match factory() {
                Plugin::PortScanner(plugin) => {
                    Some(PluginMatchingResult::new(definition.clone(), plugin, Vec::new()))
                }
                other => {
                    warn!(plugin_id = %definition.id(), "Registered as port scanner but built {:?}", other);
                    None
                }
            })
            .collect()
    }

    /// The first registered port scanner
    pub fn port_scanner(&self) -> Option<PluginMatchingResult<dyn PortScanner>> {
        self.port_scanners().into_iter().next()
    }

    /// The first registered fingerprinter whose service filters match `network_service`
    pub fn service_fingerprinter(
        &self,
        network_service: &NetworkService,
    ) -> Option<PluginMatchingResult<dyn ServiceFingerprinter>> {
        self.registry
            .by_type(PluginType::ServiceFingerprint)
            .filter(|(definition, _)| has_matching_service_name(network_service, definition))
            .find_map(|(definition, factory)| match factory() {
                Plugin::ServiceFingerprinter(plugin) => Some(PluginMatchingResult::new(
                    definition.clone(),
                    plugin,
                    vec![network_service.clone()],
                )),
                _ => None,
            })
    }

    /// Every vulnerability detector that applies to at least one service of the report.
    ///
    /// Remote detectors are always returned with all services; the remote plugins
    /// they host are matched here and queued on the returned proxy instance.
    pub async fn vuln_detectors(
        &self,
        reconnaissance_report: &ReconnaissanceReport,
    ) -> Vec<PluginMatchingResult<dyn VulnDetector>> {
        let mut matched = Vec::new();
        let candidates = self
            .registry
            .entries()
            .filter(|(definition, _)| definition.plugin_type.is_vuln_detector())
            .filter(|(definition, _)| self.matches_callback_server_setup(definition))
            .filter(|(definition, _)| self.is_selected_by_name(definition));

        for (definition, factory) in candidates {
            match factory() {
                Plugin::VulnDetector(plugin) => {
                    let services = matched_services(definition, reconnaissance_report);
                    if services.is_empty() {
                        debug!(plugin_id = %definition.id(), "No matching services");
                        continue;
                    }
                    matched.push(PluginMatchingResult::new(definition.clone(), plugin, services));
                }
                Plugin::RemoteVulnDetector(remote) => {
                    match remote.get_all_plugins().await {
                        Ok(remote_plugins) => {
                            for remote_definition in remote_plugins {
                                let services =
                                    matched_services(&remote_definition, reconnaissance_report);
                                remote
                                    .add_matched_plugin_to_detect(MatchedPlugin {
                                        plugin: remote_definition,
                                        services,
                                    })
                                    .await;
                            }
                        }
                        Err(e) => {
                            // detect() on this proxy reports the failure against its plugin id.
                            warn!(
                                plugin_id = %definition.id(),
                                "Failed to list remote plugins: {}", e
                            );
                        }
                    }
                    matched.push(PluginMatchingResult::new(
                        definition.clone(),
                        remote.as_vuln_detector(),
                        reconnaissance_report.network_services.clone(),
                    ));
                }
                other => {
                    warn!(plugin_id = %definition.id(), "Registered as detector but built {:?}", other);
                }
            }
        }
        matched
    }

    /// One instance of every local and remote detector, ignoring all filters
    pub fn all_vuln_detectors(&self) -> Vec<Arc<dyn VulnDetector>> {
        self.registry
            .entries()
            .filter(|(definition, _)| definition.plugin_type.is_vuln_detector())
            .filter_map(|(_, factory)| match factory() {
                Plugin::VulnDetector(plugin) => Some(plugin),
                Plugin::RemoteVulnDetector(remote) => Some(remote.as_vuln_detector()),
                _ => None,
            })
            .collect()
    }

    fn matches_callback_server_setup(&self, definition: &PluginDefinition) -> bool {
        self.callback_server_enabled || !definition.requires_callback_server
    }

    fn is_selected_by_name(&self, definition: &PluginDefinition) -> bool {
        let included = self.detectors_include.is_empty()
            || self.detectors_include.iter().any(|n| *n == definition.name);
        let excluded = self.detectors_exclude.iter().any(|n| *n == definition.name);
        included && !excluded
    }
}

/// Services of the report that `definition` applies to
fn matched_services(
    definition: &PluginDefinition,
    reconnaissance_report: &ReconnaissanceReport,
) -> Vec<NetworkService> {
    if let Some(os_class) = &definition.target_operating_system_class {
        if !has_matching_operating_system(&reconnaissance_report.target_info, os_class) {
            return Vec::new();
        }
    }

    if !definition.has_service_filters() {
        return reconnaissance_report.network_services.clone();
    }

    reconnaissance_report
        .network_services
        .iter()
        .filter(|service| {
            has_matching_service_name(service, definition) || has_matching_software(service, definition)
        })
        .cloned()
        .collect()
}

/// False when the target has no OS guesses at all.
fn has_matching_operating_system(
    target_info: &TargetInfo,
    os_class: &TargetOperatingSystemClass,
) -> bool {
    target_info.operating_system_classes.iter().any(|guess| {
        if os_class.min_accuracy != 0 && os_class.min_accuracy > guess.accuracy {
            return false;
        }
        os_class.vendor.contains(&guess.vendor) || os_class.os_family.contains(&guess.os_family)
    })
}

fn has_matching_service_name(service: &NetworkService, definition: &PluginDefinition) -> bool {
    let name_match = definition.target_service_names.as_ref().is_some_and(|names| {
        service.service_name.is_empty()
            || names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&service.service_name))
    });
    let web_match = definition.for_web_service && service.is_web_service();
    name_match || web_match
}

fn has_matching_software(service: &NetworkService, definition: &PluginDefinition) -> bool {
    let software_name = service.software_name();
    definition.target_software.as_ref().is_some_and(|target| {
        software_name.is_empty() || target.eq_ignore_ascii_case(software_name)
    })
}
