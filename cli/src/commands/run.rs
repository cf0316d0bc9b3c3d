// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `conduit run` - host a coordinator until Ctrl-C

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use conduit_core::domain::node_config::{MetricsConfig, NodeConfigManifest};
use conduit_core::infrastructure::event_bus::Subscription;
use conduit_core::Coordinator;

pub async fn execute(config_path: Option<PathBuf>, emit_events: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let coordinator = Coordinator::from_config(&config).context("Failed to start coordinator")?;

    if let Some(metrics) = config.spec.observability.as_ref().and_then(|o| o.metrics.as_ref()) {
        install_metrics(metrics)?;
    }

    let tap = emit_events.then(|| spawn_event_tap(coordinator.event_bus().subscribe_all()));

    info!(node = %config.metadata.name, "Conduit node running");
    eprintln!("{}", "Conduit node running. Press Ctrl-C to stop.".green());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Interrupt received");
    coordinator.shutdown().await;

    if let Some(tap) = tap {
        tap.abort();
    }

    eprintln!("{}", "✓ Conduit node stopped".green());
    Ok(())
}

fn install_metrics(metrics: &MetricsConfig) -> Result<()> {
    if !metrics.enabled {
        return Ok(());
    }

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], metrics.port))
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(port = metrics.port, "Prometheus metrics exporter listening");
    Ok(())
}

/// Line-delimited JSON of every event on stdout
fn spawn_event_tap(mut subscription: Subscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match event.to_json_line() {
                Ok(line) => {
                    let mut stdout = std::io::stdout().lock();
                    if writeln!(stdout, "{}", line).is_err() {
                        warn!("stdout closed, stopping event output");
                        break;
                    }
                }
                Err(e) => warn!(kind = %event.kind, "Failed to serialize event: {}", e),
            }
        }
    })
}
