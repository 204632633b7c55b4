// Main entry point - Dependency injection, server setup and one-shot generation
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::panel_fetch::PanelFetchOrchestrator;
use crate::application::report_service::ReportService;
use crate::infrastructure::config::{load_config, load_templates, AppConfig};
use crate::infrastructure::grafana_repository::GrafanaRepository;
use crate::infrastructure::latex_assembler::LatexAssembler;
use crate::presentation::app_state::AppState;
use crate::presentation::cli::{run_generate, Cli, Command};
use crate::presentation::handlers::{generate_report, get_defaults, get_template, health_check, list_templates};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_config()?;
    let report_service = build_service(&config)?;

    match cli.cmd {
        None | Some(Command::Serve) => serve(&config, report_service).await,
        Some(Command::Generate(args)) => {
            let output_dir = args.output_dir.clone().unwrap_or_else(|| config.report.reports_dir());
            run_generate(&report_service, &args, &output_dir, config.grafana.credentials_file.as_deref()).await?;
            Ok(())
        }
    }
}

fn build_service(config: &AppConfig) -> anyhow::Result<ReportService> {
    let templates = load_templates(&config.templates, &config.report.default_template)?;

    // Create adapters (infrastructure layer)
    let repository = Arc::new(GrafanaRepository::new(&config.grafana)?);
    let assembler = Arc::new(LatexAssembler::new(
        config.report.reports_dir(),
        config.report.typesetter.clone(),
        config.report.typesetter_args.clone(),
        config.report.screen_resolution_width,
    ));

    // Create services (application layer)
    let orchestrator = PanelFetchOrchestrator::new(repository.clone(), config.report.fetch_settings());
    Ok(ReportService::new(
        repository,
        orchestrator,
        assembler,
        Arc::new(templates),
        config.report.options(),
    ))
}

async fn serve(config: &AppConfig, report_service: ReportService) -> anyhow::Result<()> {
    // Create application state
    let state = Arc::new(AppState {
        report_service,
        credentials_file: config.grafana.credentials_file.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/api/v1/report/:uid", get(generate_report).post(generate_report))
        .route("/api/v1/templates", get(list_templates))
        .route("/api/v1/template/:name", get(get_template))
        .route("/api/v1/defaults", get(get_defaults))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address {:?}", config.server.listen))?;
    tracing::info!(
        "Starting grafana-reporter on {} (Grafana at {}, {} concurrent render requests)",
        addr,
        config.grafana.endpoint,
        config.report.max_concurrent_render_requests
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining in-flight reports");
}
