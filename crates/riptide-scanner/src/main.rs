//! Riptide Scanner - Network vulnerability scanner
//!
//! Port scans one target, fingerprints what it finds and runs every matching
//! vulnerability detector, locally and on configured language servers.

mod archive;
mod port_scan;

use anyhow::{bail, Context, Result};
use archive::LocalFileArchiver;
use clap::Parser;
use port_scan::{ports, PortScanConfig, TcpConnectPortScanner};
use riptide_common::logging::{init_logging_with_config, LogConfig};
use riptide_common::Config;
use riptide_core::{ScanStatus, ScanTarget};
use riptide_plugin::{PluginManager, PluginRegistry};
use riptide_transport::{register_language_servers, LanguageServerLauncher};
use riptide_workflow::{AdvisoriesWorkflow, DefaultScanningWorkflow};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Riptide Network Scanner
#[derive(Parser, Debug)]
#[command(name = "riptide-scanner")]
#[command(version)]
#[command(about = "Network vulnerability scanner", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/riptide/scanner.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<String>,

    /// IPv4 address of the scan target
    #[arg(long)]
    ip_v4_target: Option<Ipv4Addr>,

    /// IPv6 address of the scan target
    #[arg(long)]
    ip_v6_target: Option<Ipv6Addr>,

    /// Hostname of the scan target
    #[arg(long)]
    hostname_target: Option<String>,

    /// Ports to scan, e.g. "22,80,8000-8100" (default: top 100)
    #[arg(long)]
    ports: Option<String>,

    /// Write scan results as JSON to this file
    #[arg(long)]
    scan_results_local_output_filename: Option<PathBuf>,

    /// Write the advisories of every detector to this file and exit
    #[arg(long)]
    dump_advisories: Option<PathBuf>,

    /// Only run these detectors (comma separated)
    #[arg(long, value_delimiter = ',')]
    detectors_include: Vec<String>,

    /// Never run these detectors (comma separated)
    #[arg(long, value_delimiter = ',')]
    detectors_exclude: Vec<String>,
}

impl Args {
    fn scan_target(&self) -> Result<ScanTarget> {
        match (
            self.ip_v4_target,
            self.ip_v6_target,
            self.hostname_target.as_deref(),
        ) {
            (Some(ip), None, None) => Ok(ScanTarget::ip(ip.into())),
            (None, Some(ip), None) => Ok(ScanTarget::ip(ip.into())),
            (None, None, Some(hostname)) if !hostname.trim().is_empty() => {
                Ok(ScanTarget::hostname(hostname.trim()))
            }
            (None, None, None) => {
                bail!("One of --ip-v4-target, --ip-v6-target or --hostname-target is required")
            }
            _ => bail!("Exactly one of --ip-v4-target, --ip-v6-target or --hostname-target is allowed"),
        }
    }

    fn port_scan_config(&self) -> Result<PortScanConfig> {
        let mut config = PortScanConfig::default();
        if let Some(spec) = &self.ports {
            config.ports = ports::parse_port_spec(spec)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Invalid --ports")?;
        }
        Ok(config)
    }

    /// Command-line flags win over the config file and environment
    fn apply_to(&self, config: &mut Config) {
        if !self.detectors_include.is_empty() {
            config.plugin_manager.detectors_include = self.detectors_include.clone();
        }
        if !self.detectors_exclude.is_empty() {
            config.plugin_manager.detectors_exclude = self.detectors_exclude.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        Config::default()
    };
    let mut config = config.merge_env();
    args.apply_to(&mut config);
    Ok(config)
}

fn build_registry(args: &Args, config: &Config) -> Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();

    let port_scan_config = args.port_scan_config()?;
    registry.register_port_scanner(TcpConnectPortScanner::definition(), move || {
        TcpConnectPortScanner::with_config(port_scan_config.clone())
    });

    let servers = register_language_servers(&mut registry, &config.language_servers)?;
    info!("Registered {} plugin(s), {} language server(s)", registry.len(), servers);
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::from_settings(&config.logging));

    info!("Riptide Scanner starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(build_registry(&args, &config)?);
    let mut launcher = LanguageServerLauncher::launch(&config.language_servers);

    let exit_code = match &args.dump_advisories {
        Some(path) => {
            let manager = PluginManager::from_config(
                Arc::clone(&registry),
                &config.plugin_manager,
                &config.callback_server,
            );
            AdvisoriesWorkflow::new(Arc::new(manager)).run(path)?;
            ExitCode::SUCCESS
        }
        None => scan(&args, registry, &config).await?,
    };

    launcher.shutdown().await;
    Ok(exit_code)
}

async fn scan(args: &Args, registry: Arc<PluginRegistry>, config: &Config) -> Result<ExitCode> {
    let target = args.scan_target()?;
    let mut workflow = DefaultScanningWorkflow::from_config(registry, config);

    let cancellation = workflow.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling scan...");
            cancellation.cancel();
        }
    });

    let results = workflow.run_async(&target).await;
    info!(
        status = results.scan_status.as_str(),
        findings = results.scan_findings.len(),
        duration_ms = results.scan_duration.as_millis() as u64,
        "Scan finished"
    );
    if !results.status_message.is_empty() {
        info!("Status message: {}", results.status_message);
    }

    if let Some(path) = &args.scan_results_local_output_filename {
        let archiver = LocalFileArchiver::new(path);
        if let Err(e) = archiver.archive(&results) {
            error!(path = %path.display(), "Failed to archive scan results: {}", e);
            return Err(e.into());
        }
    }

    Ok(match results.scan_status {
        ScanStatus::Failed => ExitCode::FAILURE,
        ScanStatus::Succeeded | ScanStatus::PartiallySucceeded => ExitCode::SUCCESS,
    })
}
