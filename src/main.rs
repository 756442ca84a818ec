//! # dashmcp
//!
//! Dashboard testing MCP server binary: loads settings, installs logging,
//! serves `/mcp` until SIGINT or SIGTERM, then closes every session.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dashmcp_core::settings::{self, Settings};
use dashmcp_telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use dashmcp_tools::{dashboard_registry, DashboardClient};
use tracing::Level;

/// Dashboard testing MCP server.
#[derive(Parser, Debug)]
#[command(name = "dashmcp", about = "Dashboard testing MCP server (Streamable HTTP)")]
struct Cli {
    /// Host to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = CliLogFormat::Json)]
    log_format: CliLogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CliLogFormat {
    Json,
    Pretty,
}

impl From<CliLogFormat> for LogFormat {
    fn from(f: CliLogFormat) -> Self {
        match f {
            CliLogFormat::Json => LogFormat::Json,
            CliLogFormat::Pretty => LogFormat::Pretty,
        }
    }
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

fn telemetry_config(format: LogFormat, debug: bool) -> TelemetryConfig {
    TelemetryConfig {
        log_level: if debug { Level::DEBUG } else { Level::INFO },
        format,
        ..TelemetryConfig::default()
    }
}

/// Resolves when the process is asked to stop.
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for ctrl-c")?;
                Ok("SIGINT")
            }
            _ = term.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl-c")?;
        Ok("ctrl-c")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let telemetry = init_telemetry(telemetry_config(
        args.log_format.into(),
        settings::debug_requested(),
    ))
    .context("Failed to initialize logging")?;
    tracing::debug!(filter = telemetry.directive(), "logging initialized");

    let mut settings = Settings::from_env();
    args.apply(&mut settings);
    settings.validate().context("Invalid configuration")?;

    tracing::info!(
        server = %settings.server.name,
        version = %settings.server.version,
        dashboard = %settings.dashboard.api_url,
        "starting dashboard testing MCP server"
    );

    let client = DashboardClient::new(&settings.dashboard)
        .context("Failed to build dashboard API client")?;
    let tools = Arc::new(dashboard_registry(Arc::new(client)));

    let handle = dashmcp_server::start(&settings, tools)
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                settings.server.host, settings.server.port
            )
        })?;
    tracing::info!(port = handle.port, "server ready");

    let signal = shutdown_signal().await?;
    tracing::info!(signal, "shutting down");

    let report = handle.shutdown().await;
    tracing::info!(
        closed = report.closed,
        failed = report.failed,
        timed_out = report.timed_out,
        "all sessions closed"
    );
    Ok(())
}
