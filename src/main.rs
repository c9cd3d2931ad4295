use booking_ingestion::{config::AppConfig, http_service::HttpService};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("booking_ingestion=debug".parse()?)
                .add_directive("mongodb=info".parse()?)
                .add_directive("sqlx=warn".parse()?),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting booking ingestion service");
    let config = AppConfig::load()?;
    debug!(
        "Configuration: database={:?}, bind={}, admins={}",
        config.database_type,
        config.server.bind_addr,
        config.admins.len()
    );

    let service = HttpService::new(config).await?;
    info!("HTTP service initialized successfully");

    service.run().await
}
