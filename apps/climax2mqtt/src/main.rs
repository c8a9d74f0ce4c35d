mod cli;
mod commands;
mod config;
mod device;
mod history;
mod messages;
mod mqtt;
mod panel;
mod reconcile;
mod repository;
mod status;

use crate::cli::{Cli, Commands, HistoryArgs, SwitchArgs};
use crate::config::Config;
use crate::device::DeviceId;
use crate::history::DeviceHistory;
use crate::panel::PanelClient;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

fn init_tracing(config: &Config) -> Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as OTelTraceConfig, Resource};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,climax2mqtt=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    let endpoint = config
        .otlp_endpoint
        .as_deref()
        .map(normalize_otlp_http_endpoint)
        .filter(|endpoint| !endpoint.is_empty());
    if let Some(endpoint) = endpoint {
        let exporter = opentelemetry_otlp::new_exporter()
            .http()
            .with_endpoint(endpoint);
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(OTelTraceConfig::default().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "climax2mqtt"),
            ])))
            .install_batch(Tokio)?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

fn normalize_otlp_http_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.contains("/v1/traces") {
        return trimmed.to_string();
    }
    format!("{}/v1/traces", trimmed.trim_end_matches('/'))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let panel = PanelClient::new(&config).context("failed to build panel HTTP client")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bridge(config, panel).await,
        Commands::Devices => print_devices(&panel).await,
        Commands::History(args) => print_history(&panel, args).await,
        Commands::Switch(args) => switch_device(&panel, args).await,
    }
}

async fn run_bridge(config: Config, panel: PanelClient) -> Result<()> {
    tracing::info!(config = ?config, "starting climax2mqtt");

    let (publisher, eventloop) = mqtt::connect(&config);

    let mqtt_handle = {
        let config = config.clone();
        let publisher = publisher.clone();
        let panel = panel.clone();
        tokio::spawn(async move {
            if let Err(err) = mqtt::run_event_loop(config, publisher, eventloop, panel).await {
                tracing::error!(error = %err, "MQTT event loop exited");
            }
        })
    };

    let reconcile_handle = tokio::spawn(reconcile::run(config, panel, publisher));

    tokio::select! {
        res = mqtt_handle => {
            if let Err(err) = res { tracing::error!(error = %err, "MQTT task failed"); }
        }
        res = reconcile_handle => {
            if let Err(err) = res { tracing::error!(error = %err, "reconcile task failed"); }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

async fn print_devices(panel: &PanelClient) -> Result<()> {
    let devices = panel
        .fetch_devices()
        .await
        .context("failed to fetch devices")?;
    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(())
}

#[derive(Serialize)]
struct HistoryLine<'a> {
    id: DeviceId,
    numeric_value: Option<f64>,
    #[serde(flatten)]
    row: &'a DeviceHistory,
}

async fn print_history(panel: &PanelClient, args: HistoryArgs) -> Result<()> {
    let rows = panel
        .fetch_history(args.max_count)
        .await
        .context("failed to fetch history")?;
    let lines: Vec<HistoryLine<'_>> = rows
        .iter()
        .map(|row| HistoryLine {
            id: row.device_id(),
            numeric_value: row.numeric_value(),
            row,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&lines)?);
    Ok(())
}

async fn switch_device(panel: &PanelClient, args: SwitchArgs) -> Result<()> {
    let panel_id = DeviceId::normalize(&args.id).to_panel_id();
    let message = panel
        .set_device_switch(&panel_id, args.state.into(), args.pd.as_deref())
        .await
        .with_context(|| format!("failed to switch {panel_id}"))?;
    println!("{panel_id}: {message}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::normalize_otlp_http_endpoint;

    #[test]
    fn otlp_endpoint_gets_traces_path() {
        assert_eq!(
            normalize_otlp_http_endpoint("http://collector:4318/"),
            "http://collector:4318/v1/traces"
        );
        assert_eq!(
            normalize_otlp_http_endpoint("http://collector:4318/v1/traces"),
            "http://collector:4318/v1/traces"
        );
        assert_eq!(normalize_otlp_http_endpoint("  "), "");
    }
}
