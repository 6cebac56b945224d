//! Language server registration and process launching

use crate::client::{HttpPluginService, PluginService};
use crate::remote::RemoteVulnDetectorImpl;
use riptide_common::LanguageServerConfig;
use riptide_core::{Error, Result};
use riptide_plugin::{PluginDefinition, PluginRegistry, PluginType};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Register one remote detector per configured language server.
///
/// Returns the number of servers registered.
pub fn register_language_servers(
    registry: &mut PluginRegistry,
    servers: &[LanguageServerConfig],
) -> Result<usize> {
    for (index, server) in servers.iter().enumerate() {
        let service: Arc<dyn PluginService> = Arc::new(
            HttpPluginService::new(server.base_url())
                .map_err(|e| Error::Transport(e.to_string()))?
                .with_max_inbound_message_bytes(server.max_inbound_message_bytes),
        );
        let suffix = server
            .log_id
            .clone()
            .unwrap_or_else(|| index.to_string());
        let definition = PluginDefinition::for_dynamic_plugin(
            PluginType::RemoteVulnDetection,
            format!("RemoteVulnDetector-{}", suffix),
            "remote",
            false,
            false,
        );
        info!(
            plugin_id = %definition.id(),
            address = %server.base_url(),
            "Registering language server"
        );

        let deadline = server.deadline();
        let max_attempts = server.health_check_attempts;
        registry.register_remote_vuln_detector(definition, move || {
            RemoteVulnDetectorImpl::new(Arc::clone(&service))
                .with_deadline(deadline)
                .with_max_attempts(max_attempts)
        });
    }
    Ok(servers.len())
}

/// Child processes of locally launched language servers
#[derive(Debug, Default)]
pub struct LanguageServerLauncher {
    children: Vec<Child>,
}

impl LanguageServerLauncher {
    /// Start every server that has a `command`. Servers that fail to start are skipped.
    pub fn launch(servers: &[LanguageServerConfig]) -> Self {
        info!("Starting language server processes (if any)...");
        let mut children = Vec::new();
        for server in servers {
            let Some(mut command) = build_command(server) else {
                continue;
            };
            match command.spawn() {
                Ok(child) => {
                    info!(pid = child.id(), address = %server.address, "Language server started");
                    children.push(child);
                }
                Err(e) => {
                    warn!(error = %e, address = %server.address, "Could not execute language server binary");
                }
            }
        }
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Kill all launched servers
    pub async fn shutdown(&mut self) {
        for mut child in self.children.drain(..) {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to stop language server");
            }
        }
    }
}

/// Server arguments, skipping empty or zero values
fn server_args(server: &LanguageServerConfig) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(port) = server.port().filter(|p| *p != 0) {
        args.push(format!("--port={}", port));
    }
    if let Some(log_id) = server.log_id.as_deref().filter(|id| !id.is_empty()) {
        args.push(format!("--log_id={}", log_id));
    }
    if server.deadline_seconds != 0 {
        args.push(format!("--timeout_seconds={}", server.deadline_seconds));
    }
    args
}

fn build_command(server: &LanguageServerConfig) -> Option<Command> {
    let command_line = server.command.as_deref()?;
    let mut parts = command_line.split_whitespace();
    let program = parts.next()?;

    let mut command = Command::new(program);
    command
        .args(parts)
        .args(server_args(server))
        .stdin(Stdio::null())
        .kill_on_drop(true);
    Some(command)
}
