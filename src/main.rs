use database::Database;
use gateway_client::GatewayApiClient;
use ingestion_service::{shutdown_channel, IngestionService};
use std::sync::Arc;
use trendlens_core::{AppConfig, CoreError};

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trendlens=info,ingestion_service=info,gateway_client=info".into()),
        )
        .init();

    tracing::info!("Starting Trendlens - social content ingestion");

    let config = AppConfig::load()?;
    if config.watch.is_empty() {
        tracing::warn!("No watch targets configured; the polling loop will idle");
    }

    let database = Arc::new(Database::connect(&config.database_url).await?);
    database.run_migrations().await?;

    let client = Arc::new(GatewayApiClient::new(&config.gateway));

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let service = IngestionService::new(client, database, config).with_shutdown(shutdown_rx);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down after the current page");
            let _ = shutdown_tx.send(true);
        }
    });

    service.start().await
}
