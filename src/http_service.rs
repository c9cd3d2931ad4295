use std::sync::Arc;

use axum::Router;
use tracing::{debug, error, info};

use crate::{
    api::{self, auth::StaticTokenAuthenticator, AppState},
    application::ingestion_service::IngestionService,
    config::{AppConfig, DatabaseType},
    domain::ports::{AuditLog, RecordStore, TenantRepository},
    infrastructure::{
        mongodb::{self as mongo, MongoDataRepository, MongoLogRepository, MongoTenantRepository},
        parser_adapter::ParserAdapter,
        sqlite::{self, SqliteDataRepository, SqliteLogRepository, SqliteTenantRepository},
    },
};

/// Multipart framing and form fields on top of the file itself.
const ENVELOPE_BYTES: usize = 1024 * 1024;

type Backend = (Arc<dyn TenantRepository>, Arc<dyn RecordStore>, Arc<dyn AuditLog>);

pub struct HttpService {
    router: Router,
    bind_addr: String,
}

impl HttpService {
    pub async fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        debug!("Initializing HTTP service");

        let parser = Arc::new(ParserAdapter::new(config.ingestion.max_file_bytes));
        let settings = config.ingestion_settings()?;
        let engine = config.upsert_engine();
        info!(
            "Lookup chunk size {}, transaction timeout {}s",
            config.ingestion.lookup_chunk_size, config.ingestion.transaction_timeout_secs
        );

        info!("Using database type: {:?}", config.database_type);
        let (tenant_repo, data_repo, log_repo): Backend = match config.database_type {
            DatabaseType::Sqlite => {
                debug!("Initializing SQLite repositories");
                let pool = sqlite::connect(&config.sqlite.url).await?;
                sqlite::init_schema(&pool).await?;
                let tenant_repo: Arc<dyn TenantRepository> = Arc::new(SqliteTenantRepository::new(pool.clone()));
                let data_repo: Arc<dyn RecordStore> = Arc::new(SqliteDataRepository::new(pool.clone()));
                let log_repo: Arc<dyn AuditLog> = Arc::new(SqliteLogRepository::new(pool));
                (tenant_repo, data_repo, log_repo)
            }
            DatabaseType::Mongodb => {
                debug!("Initializing MongoDB repositories");
                info!("MongoDB URI: {}, Database: {}", config.mongodb.uri, config.mongodb.database);
                let client = mongodb::Client::with_uri_str(&config.mongodb.uri).await.map_err(|e| {
                    error!("Failed to connect to MongoDB: {}", e);
                    e
                })?;
                mongo::ensure_indexes(&client, &config.mongodb.database).await?;
                let tenant_repo: Arc<dyn TenantRepository> =
                    Arc::new(MongoTenantRepository::new(&client, &config.mongodb.database));
                let data_repo: Arc<dyn RecordStore> =
                    Arc::new(MongoDataRepository::new(client.clone(), config.mongodb.database.clone()));
                let log_repo: Arc<dyn AuditLog> = Arc::new(MongoLogRepository::new(client, config.mongodb.database.clone()));
                (tenant_repo, data_repo, log_repo)
            }
        };
        debug!("Repositories initialized");

        let service = IngestionService::new(parser, tenant_repo, data_repo, log_repo, engine, settings);
        if config.admins.is_empty() {
            error!("No admin credentials configured; every request will be rejected");
        }
        let state = AppState {
            service: Arc::new(service),
            authenticator: Arc::new(StaticTokenAuthenticator::new(&config.admins)),
            body_limit: config.ingestion.max_file_bytes + ENVELOPE_BYTES,
        };

        debug!("HTTP service initialization complete");
        Ok(Self {
            router: api::router(state),
            bind_addr: config.server.bind_addr,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await.map_err(|e| {
            error!("Failed to bind {}: {}", self.bind_addr, e);
            e
        })?;
        info!("Listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
