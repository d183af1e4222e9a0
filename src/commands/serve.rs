use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use schemagate::config::Config;
use schemagate::server::{SchemaServer, ServerConfig};
use schemagate::service::SchemaService;
use schemagate::upstream::load_entities;

/// Parameters for the serve command
pub struct ServeParams {
    pub config: Option<PathBuf>,
    pub bind: Option<String>,
    pub warm: Vec<String>,
}

/// Start the schema server
pub async fn serve(params: ServeParams) -> Result<()> {
    let ServeParams { config, bind, warm } = params;

    let mut config = match &config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    config.validate().context("Invalid configuration")?;

    if let Err(e) = schemagate::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let service = Arc::new(SchemaService::from_config(&config).context("Failed to create schema service")?);

    // Seed mappings from the entities file so the sitemap is complete at startup
    if let Some(path) = &config.upstream.entities_file {
        let entities = load_entities(path)
            .with_context(|| format!("Failed to load entities from {}", path.display()))?;
        let report = service.ingest(&entities).await;
        tracing::info!(
            file = %path.display(),
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "Seeded entities"
        );
        for failure in &report.failures {
            tracing::warn!(entity = %failure.key, error = %failure.error, "Entity rejected");
        }
    }

    let mut server_config = ServerConfig::from_config(&config)?;
    server_config.warm_keys = warm;

    let server = SchemaServer::new(server_config, service).context("Failed to create schema server")?;

    println!("{}", server.info().display());
    println!();

    server.start_with_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
