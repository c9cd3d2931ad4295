use async_trait::async_trait;
use mongodb::{bson::doc, options::ReplaceOptions, Client, Collection};
use tracing::{debug, error, info};

use super::{map_mongo_error, CLIENTS};
use crate::domain::{
    error::IngestionError,
    models::{Tenant, TenantId},
    ports::TenantRepository,
};

pub struct MongoTenantRepository {
    collection: Collection<Tenant>,
}

impl MongoTenantRepository {
    pub fn new(client: &Client, database: &str) -> Self {
        debug!("Initializing MongoDB tenant repository for database: {}", database);
        let collection = client.database(database).collection(CLIENTS);
        Self { collection }
    }
}

#[async_trait]
impl TenantRepository for MongoTenantRepository {
    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, IngestionError> {
        debug!("Looking up tenant {}", id);
        self.collection
            .find_one(doc! { "client_id": id.0 }, None)
            .await
            .map_err(|e| {
                error!("Failed to query tenant {}: {}", id, e);
                map_mongo_error(e)
            })
    }

    async fn save_tenant(&self, tenant: &Tenant) -> Result<(), IngestionError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(doc! { "client_id": tenant.client_id.0 }, tenant, options)
            .await
            .map_err(|e| {
                error!("Failed to save tenant {}: {}", tenant.client_id, e);
                map_mongo_error(e)
            })?;
        info!("✅ Saved tenant {} ({})", tenant.client_id, tenant.company_name);
        Ok(())
    }
}
