use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;

use nx_domain::config::ObservabilityConfig;
use nx_host::bootstrap;
use nx_host::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Relay { env, command } => {
            init_cli_tracing();
            let (config, _) = nx_host::cli::load_config()?;
            let code = nx_host::cli::relay::run(&config.relay, &command, env).await;
            // Blocking stdin reads would otherwise hold runtime shutdown.
            std::process::exit(code);
        }
        Command::Start => {
            let (config, _config_path) = nx_host::cli::load_config()?;
            let tracer_provider = init_tracing(&config.observability);
            let result = run_host(Arc::new(config)).await;

            if let Some(provider) = tracer_provider {
                if let Err(e) = provider.shutdown() {
                    tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
                }
            }
            result
        }
        Command::Status => {
            init_cli_tracing();
            let (config, _) = nx_host::cli::load_config()?;
            let host = bootstrap::build_host(Arc::new(config))?;
            print_json(&host.status())
        }
        Command::Logout => {
            init_cli_tracing();
            let (config, _) = nx_host::cli::load_config()?;
            let host = bootstrap::build_host(Arc::new(config))?;
            let summary = host.logout().await.context("logout")?;
            print_json(&summary)
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = nx_host::cli::load_config()?;
            if !nx_host::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = nx_host::cli::load_config()?;
            nx_host::cli::config::show(&config)
        }
    }
}

/// Authenticate, report, then wait for a termination signal.
async fn run_host(config: Arc<nx_domain::config::Config>) -> anyhow::Result<()> {
    tracing::info!("nexus-bridge starting");
    let host = bootstrap::build_host(config)?;

    let started = host.start().await;
    print_json(&host.status())?;
    let resolution = started.context("authentication failed")?;
    tracing::info!(source = %resolution.source, restored = resolution.restored, "ready");

    shutdown_signal().await;
    host.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize structured JSON tracing on stderr (only for `start`).
///
/// When `otlp_endpoint` is configured, an OpenTelemetry layer is added so
/// spans are also exported via OTLP/gRPC. The returned provider must be
/// shut down on exit to flush pending spans.
fn init_tracing(
    obs: &ObservabilityConfig,
) -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nx_host=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr);

    match &obs.otlp_endpoint {
        Some(endpoint) => {
            let exporter = match opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
            {
                Ok(e) => e,
                Err(e) => {
                    eprintln!(
                        "WARNING: failed to create OTLP exporter for {endpoint}: {e}; \
                         starting without OpenTelemetry"
                    );
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt_layer)
                        .init();
                    return None;
                }
            };

            let resource = opentelemetry_sdk::Resource::builder()
                .with_service_name(obs.service_name.clone())
                .build();

            let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
                    obs.sample_rate,
                ))
                .with_resource(resource)
                .build();

            let otel_layer = tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer("nexus-bridge"));

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(otel_layer)
                .init();

            Some(tracer_provider)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
            None
        }
    }
}

/// Compact stderr tracing for `relay` and one-shot commands.
///
/// Defaults to `warn`; stdout is never touched.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable; waiting for SIGINT only");
                let _ = ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
