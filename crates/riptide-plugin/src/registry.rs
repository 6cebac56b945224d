//! Plugin registry - registration-ordered index of all available plugins

use crate::definition::{PluginDefinition, PluginType};
use crate::plugin::{Plugin, PortScanner, RemoteVulnDetector, ServiceFingerprinter, VulnDetector};
use std::sync::Arc;
use tracing::debug;

/// Builds a fresh plugin instance
pub type PluginFactory = Arc<dyn Fn() -> Plugin + Send + Sync>;

struct RegistryEntry {
    definition: PluginDefinition,
    factory: PluginFactory,
}

/// Registry of all plugins available to the scanner.
///
/// Built once at startup and read-only afterwards. Iteration follows
/// registration order, which is what "first matching plugin" refers to.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<RegistryEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin factory. Re-registering an id replaces the factory in place.
    pub fn register(&mut self, definition: PluginDefinition, factory: PluginFactory) {
        let id = definition.id();
        match self.entries.iter_mut().find(|e| e.definition.id() == id) {
            Some(entry) => {
                debug!(plugin_id = %id, "Replacing registered plugin");
                entry.definition = definition;
                entry.factory = factory;
            }
            None => {
                debug!(plugin_id = %id, "Registered plugin");
                self.entries.push(RegistryEntry {
                    definition,
                    factory,
                });
            }
        }
    }

    pub fn register_port_scanner<P, F>(&mut self, definition: PluginDefinition, factory: F)
    where
        P: PortScanner + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        debug_assert_eq!(definition.plugin_type, PluginType::PortScan);
        self.register(
            definition,
            Arc::new(move || Plugin::PortScanner(Arc::new(factory()))),
        );
    }

    pub fn register_service_fingerprinter<P, F>(&mut self, definition: PluginDefinition, factory: F)
    where
        P: ServiceFingerprinter + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        debug_assert_eq!(definition.plugin_type, PluginType::ServiceFingerprint);
        self.register(
            definition,
            Arc::new(move || Plugin::ServiceFingerprinter(Arc::new(factory()))),
        );
    }

    pub fn register_vuln_detector<P, F>(&mut self, definition: PluginDefinition, factory: F)
    where
        P: VulnDetector + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        debug_assert_eq!(definition.plugin_type, PluginType::VulnDetection);
        self.register(
            definition,
            Arc::new(move || Plugin::VulnDetector(Arc::new(factory()))),
        );
    }

    /// Register a language-server proxy. Every lookup builds a new proxy, so
    /// plugins queued for one scan never leak into another.
    pub fn register_remote_vuln_detector<P, F>(&mut self, definition: PluginDefinition, factory: F)
    where
        P: RemoteVulnDetector + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        debug_assert_eq!(definition.plugin_type, PluginType::RemoteVulnDetection);
        self.register(
            definition,
            Arc::new(move || Plugin::RemoteVulnDetector(Arc::new(factory()))),
        );
    }

    /// Definitions of a given type with a factory for each, in registration order
    pub fn by_type(
        &self,
        plugin_type: PluginType,
    ) -> impl Iterator<Item = (&PluginDefinition, &PluginFactory)> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.definition.plugin_type == plugin_type)
            .map(|e| (&e.definition, &e.factory))
    }

    /// Definitions and factories of all entries, in registration order
    pub fn entries(&self) -> impl Iterator<Item = (&PluginDefinition, &PluginFactory)> + '_ {
        self.entries.iter().map(|e| (&e.definition, &e.factory))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &PluginDefinition> {
        self.entries.iter().map(|e| &e.definition)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
